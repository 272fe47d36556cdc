//! Command handlers for the CLI application.
//!
//! - `device`: commands that talk to the scale (list, read, watch)
//! - `utility`: offline commands (decode, config)

pub mod device;
pub mod utility;

use std::sync::Arc;

use scale_driver::DriverConfig;
use scale_transport::{DeviceRegistry, RusbBackend};

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Registry over libusb, labeling devices with the configured lookup table
pub fn open_registry(config: &DriverConfig) -> anyhow::Result<DeviceRegistry> {
    let backend = RusbBackend::new()?;
    Ok(DeviceRegistry::new(
        Arc::new(backend),
        Arc::new(config.lookup_table()),
    ))
}
