//! Driver configuration
//!
//! Stored as TOML, by default at `~/.config/scale-driver/config.toml`.
//! Every field has a default, so a missing file or an empty one yields a
//! working configuration that auto-detects the first attached scale.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use scale_transport::protocol::timing;
use scale_transport::{usb_ids, DeviceFilter, UsbIds};
use serde::{Deserialize, Serialize};

/// Extra lookup table entry for a scale missing from the built-in table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbIdEntry {
    pub vendor_id: u16,
    /// Vendor name (left unchanged when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    /// Model name; include "Scale" to make it auto-detectable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Wait before retrying after "not found" or an error (ms)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Wait between weighings while connected (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Reports taken per weighing before giving up on a settled weight
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Timeout of a single USB interrupt transfer (ms)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Which device to drive; empty means "first model containing Scale"
    #[serde(default)]
    pub device: DeviceFilter,
    /// Additions to the built-in lookup table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usb_ids: Vec<UsbIdEntry>,
}

fn default_backoff_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    300
}
fn default_max_attempts() -> usize {
    timing::DEFAULT_MAX_ATTEMPTS
}
fn default_read_timeout_ms() -> u64 {
    timing::READ_TIMEOUT_MS
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            read_timeout_ms: default_read_timeout_ms(),
            device: DeviceFilter::default(),
            usb_ids: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scale-driver")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: DriverConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the driver loop cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.read_timeout_ms == 0 {
            bail!("read_timeout_ms must be at least 1");
        }
        for entry in &self.usb_ids {
            if entry.model.is_some() && entry.product_id.is_none() {
                bail!(
                    "usb_ids entry for vendor 0x{:04x} names a model without a product_id",
                    entry.vendor_id
                );
            }
        }
        Ok(())
    }

    /// Replace device selector fields given on the command line
    pub fn apply_overrides(
        &mut self,
        vendor_id: Option<u16>,
        product_id: Option<u16>,
        manufacturer: Option<String>,
        model: Option<String>,
    ) {
        if vendor_id.is_some() {
            self.device.vendor_id = vendor_id;
        }
        if product_id.is_some() {
            self.device.product_id = product_id;
        }
        if manufacturer.is_some() {
            self.device.manufacturer = manufacturer;
        }
        if model.is_some() {
            self.device.model = model;
        }
    }

    /// Built-in lookup table merged with the `usb_ids` entries
    pub fn lookup_table(&self) -> UsbIds {
        let mut ids = usb_ids().clone();
        for entry in &self.usb_ids {
            if let Some(vendor) = &entry.vendor {
                ids.set_vendor_name(entry.vendor_id, vendor);
            }
            if let (Some(pid), Some(model)) = (entry.product_id, &entry.model) {
                ids.set_product_name(entry.vendor_id, pid, model);
            }
        }
        ids
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
