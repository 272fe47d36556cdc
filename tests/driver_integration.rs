//! Integration tests for the driver loop.
//!
//! These run the real worker thread against the in-memory USB backend with
//! millisecond intervals: plugging, weighing, taring, zeroing, unplugging
//! and protocol faults, observed only through the public accessors.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use scale_driver::{ConnectionState, DriverConfig, ScaleDriver, UsbIdEntry};
use scale_transport::mock::{MockBackend, MockDevice, FAKE_VDR, FAUX_MFR, OTHER, SCALE};
use scale_transport::protocol::timing::DEFAULT_MAX_ATTEMPTS;
use scale_transport::usb_ids::VENDOR_METTLER_TOLEDO;
use scale_transport::{DeviceRegistry, RusbBackend, ScaleSession, WeightUnit};

const PS60: u16 = 0xF000;
const WAIT: Duration = Duration::from_secs(5);

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn fast_config() -> DriverConfig {
    DriverConfig {
        backoff_ms: 20,
        poll_interval_ms: 2,
        read_timeout_ms: 5,
        ..DriverConfig::default()
    }
}

/// Poll `f` until it returns `Some`, or give up after `WAIT`
fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(v) = f() {
            return Some(v);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn wait_for_state(driver: &ScaleDriver, state: ConnectionState) -> bool {
    wait_for(|| (driver.get_status().state == state).then_some(())).is_some()
}

fn wait_for_weight(driver: &ScaleDriver, weight: &str) -> bool {
    let weight = dec(weight);
    wait_for(|| (driver.get_weight() == Some(weight)).then_some(())).is_some()
}

// ── Full lifecycle: absent → plugged → weighed → tared → unplugged ──

#[test]
fn lifecycle_plug_weigh_tare_unplug() {
    let backend = Arc::new(MockBackend::new());
    let driver = ScaleDriver::with_backend(fast_config(), backend.clone());

    // Nothing attached yet
    assert!(wait_for_state(&driver, ConnectionState::Disconnected));
    assert_eq!(driver.get_status().messages, vec!["Scale not found"]);
    assert_eq!(driver.get_weight(), None);

    // Scale appears and reports "0 lb"
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    assert!(wait_for_state(&driver, ConnectionState::Connected));
    assert_eq!(
        driver.get_status().messages,
        vec!["Connected to Mettler Toledo PS60 Scale"]
    );
    assert!(wait_for_weight(&driver, "0"));
    assert_eq!(driver.device().map(|d| d.product_id), Some(PS60));

    device.set_weight("1.94 kg");
    assert!(wait_for_weight(&driver, "1.94"));
    let reading = driver.read_weight().unwrap();
    assert_eq!(reading.unit, WeightUnit::Kilogram);

    // Tare subtracts at the read boundary only
    assert_eq!(driver.set_tare(), Some(dec("1.94")));
    assert_eq!(driver.get_weight(), Some(Decimal::ZERO));
    driver.clear_tare();
    assert_eq!(driver.get_weight(), Some(dec("1.94")));

    // Unplugging goes through error back to "not found"
    backend.unplug(&device);
    assert!(wait_for_state(&driver, ConnectionState::Disconnected));
    assert_eq!(driver.device(), None);

    // And a new scale is picked up again
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    device.set_weight("5.10 lb");
    assert!(wait_for_state(&driver, ConnectionState::Connected));
    assert!(wait_for_weight(&driver, "5.10"));
    assert_eq!(driver.read_weight().unwrap().unit, WeightUnit::Pound);

    driver.shutdown();
    assert!(!device.is_claimed());
    assert_eq!(device.stats().attaches, 1);
}

#[test]
fn unstable_readings_leave_cache_untouched() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    device.set_weight("1.94 kg");
    let driver = ScaleDriver::with_backend(fast_config(), backend.clone());

    assert!(wait_for_weight(&driver, "1.94"));

    // In motion, 1.00 kg
    device.set_frame([3, 3, 3, 254, 100, 0]);
    let reads = device.stats().reads;
    assert!(wait_for(|| (device.stats().reads > reads + 20).then_some(())).is_some());
    assert_eq!(driver.get_weight(), Some(dec("1.94")));
    assert_eq!(driver.get_status().state, ConnectionState::Connected);

    driver.shutdown();
}

#[test]
fn protocol_mismatch_is_reported_and_recovered() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    let config = DriverConfig {
        backoff_ms: 200,
        ..fast_config()
    };
    let driver = ScaleDriver::with_backend(config, backend.clone());
    assert!(wait_for_state(&driver, ConnectionState::Connected));

    // Unit code 0x20 is outside every table
    device.set_frame([3, 4, 0x20, 254, 0, 0]);
    assert!(wait_for_state(&driver, ConnectionState::Error));
    let messages = driver.get_status().messages;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Protocol mismatch"), "{messages:?}");

    // Interface is handed back while in the error state
    assert!(wait_for(|| (!device.is_claimed()).then_some(())).is_some());

    device.set_weight("0 kg");
    assert!(wait_for_state(&driver, ConnectionState::Connected));
    assert!(wait_for_weight(&driver, "0"));

    driver.shutdown();
}

#[test]
fn single_attempt_config_stays_connected() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    device.set_weight("1.94 kg");
    let config = DriverConfig {
        max_attempts: 1,
        ..fast_config()
    };
    let driver = ScaleDriver::with_backend(config, backend.clone());

    assert!(wait_for_weight(&driver, "1.94"));
    let reads = device.stats().reads;
    assert!(wait_for(|| (device.stats().reads > reads + 20).then_some(())).is_some());
    assert_eq!(driver.get_status().state, ConnectionState::Connected);
    assert_eq!(device.stats().resets, 0);

    driver.shutdown();
}

#[test]
fn not_ready_only_device_goes_to_error() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    device.set_weight("1.94 kg");
    let config = DriverConfig {
        backoff_ms: 200,
        ..fast_config()
    };
    let driver = ScaleDriver::with_backend(config, backend.clone());
    assert!(wait_for_weight(&driver, "1.94"));

    // Still enumerated, but nothing but "not ready" for a whole read
    device.push_frames(&[4, 4], DEFAULT_MAX_ATTEMPTS);
    assert!(wait_for_state(&driver, ConnectionState::Error));
    assert_eq!(
        driver.get_status().messages,
        vec!["Connection lost: Mettler Toledo PS60 Scale not found"]
    );
    assert!(wait_for(|| (!device.is_claimed()).then_some(())).is_some());
    assert_eq!(driver.get_weight(), Some(dec("1.94")));

    assert!(wait_for(|| {
        let status = driver.get_status();
        (status.state == ConnectionState::Connected && device.is_claimed()).then_some(())
    })
    .is_some());
    driver.shutdown();
}

#[test]
fn failing_transfers_go_to_error() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    device.set_weight("5.10 lb");
    let config = DriverConfig {
        backoff_ms: 200,
        ..fast_config()
    };
    let driver = ScaleDriver::with_backend(config, backend.clone());
    assert!(wait_for_weight(&driver, "5.10"));

    device.fail_reads(Some(rusb::Error::Timeout));

    // A read already past its "not ready" frame ends as a lost connection;
    // from the next connect on every transfer fails
    let expected = "Read failed after 10 attempts: USB error: Operation timed out";
    let messages = wait_for(|| {
        let status = driver.get_status();
        (status.state == ConnectionState::Error && status.messages == vec![expected])
            .then_some(status.messages)
    });
    assert_eq!(messages, Some(vec![expected.to_string()]));
    assert!(wait_for(|| (!device.is_claimed()).then_some(())).is_some());
    assert_eq!(driver.get_weight(), Some(dec("5.10")));
    assert_eq!(driver.read_weight().unwrap().unit, WeightUnit::Pound);

    device.fail_reads(None);
    assert!(wait_for_state(&driver, ConnectionState::Connected));
    driver.shutdown();
}

#[test]
fn accessors_do_not_wait_for_shutdown() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    let driver = Arc::new(ScaleDriver::with_backend(fast_config(), backend.clone()));
    assert!(wait_for_weight(&driver, "0"));

    // Every transfer now blocks; the worker is stuck in one when shutdown starts
    device.set_read_delay(Duration::from_secs(1));
    let reads = device.stats().reads;
    assert!(wait_for(|| (device.stats().reads > reads).then_some(())).is_some());

    let stopping = {
        let driver = Arc::clone(&driver);
        std::thread::spawn(move || driver.shutdown())
    };
    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    let status = driver.get_status();
    assert!(start.elapsed() < Duration::from_millis(500), "{:?}", start.elapsed());
    assert_eq!(status.state, ConnectionState::Connected);

    stopping.join().unwrap();
    assert!(!device.is_claimed());
}

#[test]
fn zero_request_is_sent_by_worker() {
    let backend = Arc::new(MockBackend::new());
    let device = backend.plug(MockDevice::new(VENDOR_METTLER_TOLEDO, PS60));
    let driver = ScaleDriver::with_backend(fast_config(), backend.clone());
    assert!(wait_for_state(&driver, ConnectionState::Connected));

    driver.zero();
    let written = wait_for(|| {
        let written = device.written_reports();
        (!written.is_empty()).then_some(written)
    });
    assert_eq!(written, Some(vec![vec![0x02, 0x02]]));

    driver.shutdown();
}

#[test]
fn configured_names_select_device() {
    let backend = Arc::new(MockBackend::with_default_devices());
    let mut config = fast_config();
    config.usb_ids = vec![
        UsbIdEntry {
            vendor_id: FAUX_MFR,
            vendor: Some("Faux Manufacturer".into()),
            product_id: Some(SCALE),
            model: Some("Faux Scale".into()),
        },
        UsbIdEntry {
            vendor_id: FAKE_VDR,
            vendor: Some("Fake Vendor".into()),
            product_id: Some(SCALE),
            model: Some("Fake Scale".into()),
        },
        UsbIdEntry {
            vendor_id: FAKE_VDR,
            vendor: None,
            product_id: Some(OTHER),
            model: Some("Fake Device of Some Other Stripe".into()),
        },
    ];
    config.apply_overrides(None, None, Some("Fake Vendor".into()), Some("Fake Scale".into()));

    let driver = ScaleDriver::with_backend(config, backend.clone());
    assert!(wait_for_state(&driver, ConnectionState::Connected));

    let device = driver.device().unwrap();
    assert_eq!((device.vendor_id, device.product_id), (FAKE_VDR, SCALE));
    assert_eq!(device.name(), "Fake Vendor Fake Scale");

    // The other vendor's scale was never touched
    let faux = backend.device(FAUX_MFR, SCALE).unwrap();
    assert_eq!(faux.stats().configures, 0);

    driver.shutdown();
}

#[test]
fn unnamed_model_is_not_found() {
    let backend = Arc::new(MockBackend::new());
    backend.plug(MockDevice::new(0x1234, 0x0001));
    let mut config = fast_config();
    config.device.model = Some("Bench Scale".into());

    let driver = ScaleDriver::with_backend(config, backend);
    assert!(wait_for_state(&driver, ConnectionState::Disconnected));
    assert_eq!(driver.get_status().messages, vec!["Bench Scale not found"]);

    driver.shutdown();
}

// ── Real hardware ──

#[test]
#[ignore] // Requires a HID scale attached and USB permissions
fn hardware_weigh_once() {
    let config = DriverConfig::default();
    let registry = DeviceRegistry::new(
        Arc::new(RusbBackend::new().unwrap()),
        Arc::new(config.lookup_table()),
    );
    let session = ScaleSession::find(&registry, &config.device).unwrap();
    let scoped = session.scoped().unwrap();
    let data = scoped.weigh(None, config.max_attempts).unwrap();
    println!("{data:?}");
}
