//! Commands that talk to the scale

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use scale_driver::{DriverConfig, ScaleDriver, StatusSnapshot, WeightReading};
use scale_transport::ScaleSession;
use serde_json::json;
use tracing::info;

use super::{open_registry, CommandResult};

/// How often `watch` samples the driver's cached state
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// List every USB device; `*` marks the one the driver would pick
pub fn list(config: &DriverConfig) -> CommandResult {
    let registry = open_registry(config)?;
    let devices = registry.list()?;

    if devices.is_empty() {
        println!("No USB devices found");
        return Ok(());
    }

    let selected = registry
        .select(&config.device)?
        .map(|d| (d.descriptor.vendor_id, d.descriptor.product_id));

    println!("   VID:PID    Manufacturer / Model");
    for found in &devices {
        let desc = &found.descriptor;
        let marker = if selected == Some((desc.vendor_id, desc.product_id)) {
            '*'
        } else {
            ' '
        };
        println!(
            "{}  {:04x}:{:04x}  {}",
            marker,
            desc.vendor_id,
            desc.product_id,
            desc.name()
        );
    }

    if selected.is_none() {
        println!("\nNo device matches {}", config.device.label());
    }
    Ok(())
}

/// Weigh once through a scoped session
pub fn read(config: &DriverConfig, attempts: Option<usize>, json: bool) -> CommandResult {
    let attempts = attempts.unwrap_or(config.max_attempts);
    if attempts == 0 {
        bail!("--attempts must be at least 1");
    }

    let registry = open_registry(config)?;
    let session =
        ScaleSession::find(&registry, &config.device)?.with_read_timeout(config.read_timeout());
    let name = session
        .descriptor()
        .map(|d| d.to_string())
        .unwrap_or_default();

    let scoped = session.scoped()?;
    let Some(data) = scoped.weigh(None, attempts)? else {
        bail!("{name}: no stable weight after {attempts} attempts");
    };

    if json {
        println!("{}", serde_json::to_string(&data)?);
    } else {
        println!("{} {} ({})", data.weight, data.unit, data.status);
    }
    Ok(())
}

/// Run the driver and print status changes and new readings until Ctrl+C
pub fn watch(config: DriverConfig, json: bool) -> CommandResult {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let driver = ScaleDriver::new(config)?;
    driver.ensure_started();
    info!("Watching scale. Press Ctrl+C to exit.");

    let mut last_status: Option<StatusSnapshot> = None;
    let mut last_reading: Option<WeightReading> = None;

    while running.load(Ordering::SeqCst) {
        let status = driver.get_status();
        if last_status.as_ref() != Some(&status) {
            print_status(&status, json)?;
            last_status = Some(status);
        }

        let reading = driver.read_weight();
        if reading != last_reading {
            if let Some(reading) = &reading {
                print_reading(reading, json)?;
            }
            last_reading = reading;
        }

        std::thread::sleep(WATCH_INTERVAL);
    }

    info!("Stopping");
    driver.shutdown();
    Ok(())
}

fn print_status(status: &StatusSnapshot, json: bool) -> CommandResult {
    if json {
        println!("{}", serde_json::to_string(&json!({ "status": status }))?);
    } else {
        match status.messages.last() {
            Some(message) => println!("[{}] {}", status.state, message),
            None => println!("[{}]", status.state),
        }
    }
    Ok(())
}

fn print_reading(reading: &WeightReading, json: bool) -> CommandResult {
    if json {
        println!("{}", serde_json::to_string(&json!({ "reading": reading }))?);
    } else {
        println!("{} {} ({})", reading.weight, reading.unit, reading.status);
    }
    Ok(())
}
