//! libusb backend built on `rusb`

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusb::{Context, DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::hid;
use crate::types::Endpoint;
use crate::{UsbBackend, UsbDevice};

/// Enumerates devices through a libusb context
pub struct RusbBackend {
    context: Context,
}

impl RusbBackend {
    /// Create a backend with a fresh libusb context
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl UsbBackend for RusbBackend {
    fn devices(&self) -> Result<Vec<Arc<dyn UsbDevice>>, TransportError> {
        let list = self.context.devices()?;
        let mut devices: Vec<Arc<dyn UsbDevice>> = Vec::with_capacity(list.len());

        for device in list.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    debug!(
                        "Skipping device at bus {} address {}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };
            devices.push(Arc::new(RusbDevice::new(
                device,
                desc.vendor_id(),
                desc.product_id(),
            )));
        }

        Ok(devices)
    }
}

/// Open state of a device handle
struct HandleState {
    handle: Option<DeviceHandle<Context>>,
    claimed: bool,
}

/// A USB device accessed through libusb
pub struct RusbDevice {
    device: rusb::Device<Context>,
    vid: u16,
    pid: u16,
    state: Mutex<HandleState>,
}

impl RusbDevice {
    fn new(device: rusb::Device<Context>, vid: u16, pid: u16) -> Self {
        Self {
            device,
            vid,
            pid,
            state: Mutex::new(HandleState {
                handle: None,
                claimed: false,
            }),
        }
    }

    /// Run `f` on the device handle, opening it on first use
    fn with_handle<R>(
        &self,
        f: impl FnOnce(&mut DeviceHandle<Context>) -> rusb::Result<R>,
    ) -> Result<R, TransportError> {
        let mut state = self.state.lock();
        if state.handle.is_none() {
            state.handle = Some(self.device.open()?);
        }
        match state.handle.as_mut() {
            Some(handle) => f(handle).map_err(TransportError::from),
            None => Err(TransportError::NotConnected),
        }
    }
}

impl UsbDevice for RusbDevice {
    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }

    fn kernel_driver_active(&self, interface: u8) -> Result<bool, TransportError> {
        self.with_handle(|h| h.kernel_driver_active(interface))
    }

    fn detach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.with_handle(|h| h.detach_kernel_driver(interface))
    }

    fn attach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.with_handle(|h| h.attach_kernel_driver(interface))
    }

    fn set_configuration(&self) -> Result<(), TransportError> {
        let config = self.device.config_descriptor(0)?.number();
        self.with_handle(|h| {
            h.set_active_configuration(config)?;
            h.claim_interface(hid::INTERFACE)
        })?;
        self.state.lock().claimed = true;
        Ok(())
    }

    fn default_endpoint(&self) -> Result<Endpoint, TransportError> {
        let config = self.device.config_descriptor(0)?;
        config
            .interfaces()
            .next()
            .and_then(|iface| iface.descriptors().next())
            .and_then(|setting| setting.endpoint_descriptors().next())
            .map(|ep| {
                if ep.direction() != Direction::In {
                    warn!("Default endpoint 0x{:02x} is not an IN endpoint", ep.address());
                }
                Endpoint {
                    address: ep.address(),
                    max_packet_size: ep.max_packet_size(),
                }
            })
            .ok_or(TransportError::Usb(rusb::Error::NotFound))
    }

    fn read(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; usize::from(endpoint.max_packet_size.max(1))];
        let len = self.with_handle(|h| h.read_interrupt(endpoint.address, &mut buf, timeout))?;
        buf.truncate(len);
        Ok(buf)
    }

    fn write_report(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let report_id = data.first().copied().unwrap_or(0);
        let request_type = rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        let value = (u16::from(hid::REPORT_TYPE_OUTPUT) << 8) | u16::from(report_id);
        self.with_handle(|h| {
            h.write_control(
                request_type,
                hid::SET_REPORT,
                value,
                u16::from(hid::INTERFACE),
                data,
                timeout,
            )
        })
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.with_handle(|h| h.reset())
    }

    fn release_interface(&self, interface: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.claimed {
            return Ok(());
        }
        // Never opens a handle just to release
        if let Some(handle) = state.handle.as_mut() {
            handle.release_interface(interface)?;
        }
        state.claimed = false;
        Ok(())
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        if let Some(mut handle) = state.handle.take() {
            if state.claimed {
                if let Err(e) = handle.release_interface(hid::INTERFACE) {
                    debug!("Release of interface {} failed: {}", hid::INTERFACE, e);
                }
            }
        }
        state.claimed = false;
    }
}
