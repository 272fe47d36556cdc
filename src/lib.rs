//! USB HID scale driver
//!
//! Keeps a USB HID scale connected in the background and serves the last
//! stable weight, tare handling and a connection status to callers. The
//! device-level pieces (registry, report codec, session) live in the
//! `scale-transport` crate.

pub mod config;
pub mod driver;

pub use config::{DriverConfig, UsbIdEntry};
pub use driver::{ConnectionState, ScaleDriver, StatusSnapshot, WeightReading};
