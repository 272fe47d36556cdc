//! Transport layer for USB HID scales
//!
//! This crate provides everything below the driver loop:
//!
//! - Device registry (find the scale among enumerated USB devices)
//! - Report codec (HID scale usage page reports → typed reports)
//! - Scale session (claim the interface, read until a settled weight)
//! - USB backends: libusb via `rusb`, and an in-memory mock (`mock` feature)

pub mod device_registry;
pub mod error;
pub mod protocol;
pub mod report;
pub mod session;
pub mod types;
pub mod usb_ids;

mod rusb_backend;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use device_registry::{DeviceFilter, DeviceRegistry, DEFAULT_MODEL_KEYWORD};
pub use error::{DecodeError, TransportError};
pub use report::{
    calc_weight, decode, AttributesReport, ControlReport, DataReport, Report, ScaleClass,
    ScaleStatus, StatisticsReport, StatusReport, WeightLimitReport, WeightUnit,
};
pub use rusb_backend::{RusbBackend, RusbDevice};
pub use session::{ScaleSession, ScopedSession};
pub use types::{DeviceDescriptor, DiscoveredDevice, Endpoint};
pub use usb_ids::{usb_ids, UsbIds, VendorEntry};

use std::sync::Arc;
use std::time::Duration;

/// Enumerates USB devices
pub trait UsbBackend: Send + Sync {
    /// List currently attached devices in enumeration order
    fn devices(&self) -> Result<Vec<Arc<dyn UsbDevice>>, TransportError>;
}

/// Raw USB operations on one device
///
/// Implementations open the underlying handle lazily and keep it until
/// `dispose()`. All methods take `&self`; implementations serialize access
/// internally.
pub trait UsbDevice: Send + Sync {
    /// USB Vendor ID
    fn vendor_id(&self) -> u16;

    /// USB Product ID
    fn product_id(&self) -> u16;

    /// Whether a kernel driver currently owns `interface`
    ///
    /// Returns `TransportError::PlatformUnsupported` where the platform
    /// cannot tell (e.g. Windows).
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, TransportError>;

    /// Detach the kernel driver from `interface`
    fn detach_kernel_driver(&self, interface: u8) -> Result<(), TransportError>;

    /// Give `interface` back to the kernel driver
    fn attach_kernel_driver(&self, interface: u8) -> Result<(), TransportError>;

    /// Select the default configuration and claim the HID interface
    fn set_configuration(&self) -> Result<(), TransportError>;

    /// First endpoint of the first interface of the default configuration
    fn default_endpoint(&self) -> Result<Endpoint, TransportError>;

    /// One interrupt transfer from `endpoint`
    ///
    /// # Returns
    /// The bytes received (may be a 2-byte "not ready" frame)
    fn read(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Send an output report (`data[0]` is the report ID) via SET_REPORT
    fn write_report(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// USB port reset
    fn reset(&self) -> Result<(), TransportError>;

    /// Release a claimed interface, keeping the handle open
    fn release_interface(&self, interface: u8) -> Result<(), TransportError>;

    /// Release claimed interfaces and close the handle
    fn dispose(&self);
}
