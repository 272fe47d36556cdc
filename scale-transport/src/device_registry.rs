//! Device registry - finds the scale among enumerated USB devices
//!
//! Matching is first-match-wins in enumeration order. Names come from the
//! lookup table; devices missing from the table get a generic label that
//! embeds the raw ID, so they can still be listed and selected.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransportError;
use crate::types::{DeviceDescriptor, DiscoveredDevice};
use crate::usb_ids::UsbIds;
use crate::{UsbBackend, UsbDevice};

/// Substring a model name must contain to be picked without any filter
pub const DEFAULT_MODEL_KEYWORD: &str = "Scale";

/// Device selection criteria. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl DeviceFilter {
    /// Filter on manufacturer and/or model names
    pub fn by_name(manufacturer: Option<&str>, model: Option<&str>) -> Self {
        Self {
            manufacturer: manufacturer.map(str::to_string),
            model: model.map(str::to_string),
            ..Self::default()
        }
    }

    /// Filter on vendor and product IDs
    pub fn by_ids(vendor_id: u16, product_id: Option<u16>) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id,
            ..Self::default()
        }
    }

    /// True when no criterion is set (auto-detect by model name)
    pub fn is_empty(&self) -> bool {
        self.vendor_id.is_none()
            && self.product_id.is_none()
            && self.manufacturer.is_none()
            && self.model.is_none()
    }

    /// Check a resolved descriptor against this filter
    pub fn matches(&self, desc: &DeviceDescriptor) -> bool {
        if self.is_empty() {
            return desc
                .model
                .as_deref()
                .is_some_and(|m| m.contains(DEFAULT_MODEL_KEYWORD));
        }

        self.vendor_id.map_or(true, |vid| vid == desc.vendor_id)
            && self.product_id.map_or(true, |pid| pid == desc.product_id)
            && self
                .manufacturer
                .as_deref()
                .map_or(true, |m| desc.manufacturer.as_deref() == Some(m))
            && self
                .model
                .as_deref()
                .map_or(true, |m| desc.model.as_deref() == Some(m))
    }

    /// Short label for status messages, e.g. "PS60 Scale"
    pub fn label(&self) -> String {
        match (&self.model, &self.manufacturer, self.vendor_id) {
            (Some(model), _, _) => model.clone(),
            (None, Some(manufacturer), _) => format!("{manufacturer} scale"),
            (None, None, Some(vid)) => match self.product_id {
                Some(pid) => format!("Scale {vid:04x}:{pid:04x}"),
                None => format!("Scale {vid:04x}:*"),
            },
            (None, None, None) => DEFAULT_MODEL_KEYWORD.to_string(),
        }
    }
}

/// Finds and labels USB devices
#[derive(Clone)]
pub struct DeviceRegistry {
    backend: Arc<dyn UsbBackend>,
    ids: Arc<UsbIds>,
}

impl DeviceRegistry {
    /// Create a registry over a USB backend and lookup table
    pub fn new(backend: Arc<dyn UsbBackend>, ids: Arc<UsbIds>) -> Self {
        Self { backend, ids }
    }

    /// The lookup table used for labeling
    pub fn ids(&self) -> &UsbIds {
        &self.ids
    }

    /// Resolve the manufacturer name, or a generic label with the vendor ID
    pub fn resolve_manufacturer(&self, device: &dyn UsbDevice) -> String {
        let vid = device.vendor_id();
        self.ids
            .vendor_name(vid)
            .map(str::to_string)
            .unwrap_or_else(|| format!("<vendor:0x{vid:04x}>"))
    }

    /// Resolve the model name, or a generic label with the product ID
    pub fn resolve_model(&self, device: &dyn UsbDevice) -> String {
        let (vid, pid) = (device.vendor_id(), device.product_id());
        self.ids
            .product_name(vid, pid)
            .map(str::to_string)
            .unwrap_or_else(|| format!("<product:0x{pid:04x}>"))
    }

    /// Build the resolved descriptor of a device
    pub fn describe(&self, device: &dyn UsbDevice) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            manufacturer: Some(self.resolve_manufacturer(device)),
            model: Some(self.resolve_model(device)),
        }
    }

    /// List every enumerated device with resolved names
    pub fn list(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let devices = self.backend.devices()?;
        Ok(devices
            .into_iter()
            .map(|device| DiscoveredDevice {
                descriptor: self.describe(device.as_ref()),
                device,
            })
            .collect())
    }

    /// Find a device by manufacturer and/or model name.
    ///
    /// With neither given, returns the first device whose model name
    /// contains "Scale".
    pub fn find(
        &self,
        manufacturer: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<DiscoveredDevice>, TransportError> {
        self.select(&DeviceFilter::by_name(manufacturer, model))
    }

    /// Return the first enumerated device matching `filter`
    pub fn select(&self, filter: &DeviceFilter) -> Result<Option<DiscoveredDevice>, TransportError> {
        for found in self.list()? {
            if filter.matches(&found.descriptor) {
                debug!("Matched {}", found.descriptor);
                return Ok(Some(found));
            }
        }
        debug!("No device matches {:?}", filter);
        Ok(None)
    }
}
