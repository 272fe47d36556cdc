//! Common types for the transport layer

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::UsbDevice;

/// Identification of a physical USB device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Manufacturer name resolved from the lookup table
    pub manufacturer: Option<String>,
    /// Model name resolved from the lookup table
    pub model: Option<String>,
}

impl DeviceDescriptor {
    /// Display name: "<manufacturer> <model>"
    pub fn name(&self) -> String {
        match (&self.manufacturer, &self.model) {
            (Some(m), Some(p)) => format!("{m} {p}"),
            (Some(m), None) => m.clone(),
            (None, Some(p)) => p.clone(),
            (None, None) => format!("{:04X}:{:04X}", self.vendor_id, self.product_id),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x})",
            self.name(),
            self.vendor_id,
            self.product_id
        )
    }
}

/// An input endpoint to read reports from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint address (direction bit included)
    pub address: u8,
    /// Maximum packet size, used as the read buffer size
    pub max_packet_size: u16,
}

/// A device returned by discovery: resolved descriptor plus its handle
#[derive(Clone)]
pub struct DiscoveredDevice {
    pub descriptor: DeviceDescriptor,
    pub device: Arc<dyn UsbDevice>,
}

impl fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
