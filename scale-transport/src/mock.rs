//! In-memory USB backend replaying recorded scale output
//!
//! The recorded frames come from a Mettler Toledo PS60. Like the real
//! scale, a `MockDevice` alternates between a 2-byte "not ready" frame and
//! a full data report. Tests can queue extra frames or errors, unplug the
//! device, or make kernel-driver calls unsupported.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::types::Endpoint;
use crate::usb_ids::UsbIds;
use crate::{UsbBackend, UsbDevice};

/// Vendor ID named "Faux Manufacturer" in `mock_usb_ids()`
pub const FAUX_MFR: u16 = 0x0001;
/// Vendor ID named "Fake Vendor" in `mock_usb_ids()`
pub const FAKE_VDR: u16 = 0x0002;
/// Product ID of each mock vendor's scale
pub const SCALE: u16 = 0x0003;
/// Product ID of each mock vendor's non-scale device
pub const OTHER: u16 = 0x0004;

/// Frames recorded from a Mettler Toledo PS60
pub const RECORDED: &[(&str, [u8; 6])] = &[
    ("0 lb", [3, 2, 12, 254, 0, 0]),
    ("5.10 lb", [3, 4, 12, 254, 254, 1]),
    ("0 kg", [3, 2, 3, 254, 0, 0]),
    ("1.94 kg", [3, 4, 3, 254, 194, 0]),
];

/// Frame the scale sends between reports
pub const NOT_READY_FRAME: [u8; 2] = [4, 4];

/// Endpoint reported by every mock device
pub const MOCK_ENDPOINT: Endpoint = Endpoint {
    address: 0x82,
    max_packet_size: 6,
};

/// Lookup table naming the mock devices
pub fn mock_usb_ids() -> UsbIds {
    let mut ids = UsbIds::new();
    ids.set_vendor_name(FAUX_MFR, "Faux Manufacturer");
    ids.set_product_name(FAUX_MFR, SCALE, "Faux Scale");
    ids.set_product_name(FAUX_MFR, OTHER, "Faux Device of Some Other Type");
    ids.set_vendor_name(FAKE_VDR, "Fake Vendor");
    ids.set_product_name(FAKE_VDR, SCALE, "Fake Scale");
    ids.set_product_name(FAKE_VDR, OTHER, "Fake Device of Some Other Stripe");
    ids
}

/// Call counters of a mock device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub reads: usize,
    pub detaches: usize,
    pub attaches: usize,
    pub configures: usize,
    pub resets: usize,
    pub disposes: usize,
}

struct MockState {
    sample: [u8; 6],
    readied: bool,
    script: VecDeque<Result<Vec<u8>, rusb::Error>>,
    unplugged: bool,
    /// `None` means the platform cannot query kernel drivers
    kernel_driver: Option<bool>,
    claimed: bool,
    /// A handle is open (opened lazily, closed by `dispose`)
    open: bool,
    /// Persistent failure of every read, after the script is drained
    read_error: Option<rusb::Error>,
    read_delay: Duration,
    written: Vec<Vec<u8>>,
    stats: MockStats,
}

/// A simulated USB scale (or non-scale device)
pub struct MockDevice {
    vid: u16,
    pid: u16,
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Create a device that reports "0 lb" and has a kernel driver attached
    pub fn new(vid: u16, pid: u16) -> Self {
        Self {
            vid,
            pid,
            state: Mutex::new(MockState {
                sample: RECORDED[0].1,
                readied: false,
                script: VecDeque::new(),
                unplugged: false,
                kernel_driver: Some(true),
                claimed: false,
                open: false,
                read_error: None,
                read_delay: Duration::ZERO,
                written: Vec::new(),
                stats: MockStats::default(),
            }),
        }
    }

    /// Switch the steady output to one of the `RECORDED` samples
    ///
    /// # Panics
    /// If `sample` is not a recorded sample name.
    pub fn set_weight(&self, sample: &str) {
        let Some((_, frame)) = RECORDED.iter().find(|(name, _)| *name == sample) else {
            panic!("No mock data for {sample}");
        };
        self.state.lock().sample = *frame;
    }

    /// Switch the steady output to an arbitrary 6-byte frame
    pub fn set_frame(&self, frame: [u8; 6]) {
        self.state.lock().sample = frame;
    }

    /// Queue a frame returned before the steady output resumes
    pub fn push_frame(&self, frame: &[u8]) {
        self.state.lock().script.push_back(Ok(frame.to_vec()));
    }

    /// Queue `count` copies of `frame` in one step
    pub fn push_frames(&self, frame: &[u8], count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.script.push_back(Ok(frame.to_vec()));
        }
    }

    /// Queue a transfer error
    pub fn push_error(&self, error: rusb::Error) {
        self.state.lock().script.push_back(Err(error));
    }

    /// Make every operation fail with `NoDevice` (or recover)
    pub fn set_unplugged(&self, unplugged: bool) {
        self.state.lock().unplugged = unplugged;
    }

    /// Set the kernel driver state; `None` simulates an unsupported platform
    pub fn set_kernel_driver(&self, active: Option<bool>) {
        self.state.lock().kernel_driver = active;
    }

    /// Fail every read with `error` while staying enumerated (or recover)
    pub fn fail_reads(&self, error: Option<rusb::Error>) {
        self.state.lock().read_error = error;
    }

    /// Make every read block for `delay`, like a slow interrupt transfer
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    pub fn stats(&self) -> MockStats {
        self.state.lock().stats
    }

    /// Whether interface 0 is currently claimed
    pub fn is_claimed(&self) -> bool {
        self.state.lock().claimed
    }

    /// Whether a device handle is currently open
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Output reports sent to the device, oldest first
    pub fn written_reports(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    fn check_plugged(state: &MockState) -> Result<(), TransportError> {
        if state.unplugged {
            Err(rusb::Error::NoDevice.into())
        } else {
            Ok(())
        }
    }

    /// Check the device is there and open the handle if needed
    fn open_handle(state: &mut MockState) -> Result<(), TransportError> {
        Self::check_plugged(state)?;
        state.open = true;
        Ok(())
    }
}

impl UsbDevice for MockDevice {
    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }

    fn kernel_driver_active(&self, _interface: u8) -> Result<bool, TransportError> {
        let mut state = self.state.lock();
        Self::open_handle(&mut state)?;
        state
            .kernel_driver
            .ok_or_else(|| rusb::Error::NotSupported.into())
    }

    fn detach_kernel_driver(&self, _interface: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::open_handle(&mut state)?;
        if state.kernel_driver.is_none() {
            return Err(rusb::Error::NotSupported.into());
        }
        state.kernel_driver = Some(false);
        state.stats.detaches += 1;
        Ok(())
    }

    fn attach_kernel_driver(&self, _interface: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::open_handle(&mut state)?;
        if state.kernel_driver.is_none() {
            return Err(rusb::Error::NotSupported.into());
        }
        if state.claimed {
            return Err(rusb::Error::Busy.into());
        }
        state.kernel_driver = Some(true);
        state.stats.attaches += 1;
        Ok(())
    }

    fn set_configuration(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::open_handle(&mut state)?;
        if state.kernel_driver == Some(true) {
            return Err(rusb::Error::Busy.into());
        }
        state.claimed = true;
        state.stats.configures += 1;
        Ok(())
    }

    fn default_endpoint(&self) -> Result<Endpoint, TransportError> {
        Self::check_plugged(&self.state.lock())?;
        Ok(MOCK_ENDPOINT)
    }

    fn read(&self, _endpoint: &Endpoint, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let delay = {
            let mut state = self.state.lock();
            Self::open_handle(&mut state)?;
            state.read_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        Self::check_plugged(&state)?;
        state.stats.reads += 1;

        if let Some(next) = state.script.pop_front() {
            return next.map_err(TransportError::from);
        }
        if let Some(error) = state.read_error.clone() {
            return Err(error.into());
        }

        // The scale alternates "not ready" with the current reading
        state.readied = !state.readied;
        if state.readied {
            Ok(NOT_READY_FRAME.to_vec())
        } else {
            Ok(state.sample.to_vec())
        }
    }

    fn write_report(&self, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        Self::open_handle(&mut state)?;
        state.written.push(data.to_vec());
        Ok(data.len())
    }

    fn reset(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::open_handle(&mut state)?;
        state.stats.resets += 1;
        state.readied = false;
        Ok(())
    }

    fn release_interface(&self, _interface: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.claimed {
            Self::check_plugged(&state)?;
            state.claimed = false;
        }
        Ok(())
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        state.claimed = false;
        state.open = false;
        state.stats.disposes += 1;
    }
}

/// Enumerates a mutable list of `MockDevice`s
#[derive(Default)]
pub struct MockBackend {
    devices: Mutex<Vec<Arc<MockDevice>>>,
    enumeration_error: Mutex<Option<rusb::Error>>,
}

impl MockBackend {
    /// Backend with nothing plugged in
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with a scale and a non-scale device from each mock vendor
    pub fn with_default_devices() -> Self {
        let backend = Self::new();
        for (vid, pid) in [
            (FAUX_MFR, SCALE),
            (FAUX_MFR, OTHER),
            (FAKE_VDR, SCALE),
            (FAKE_VDR, OTHER),
        ] {
            backend.plug(MockDevice::new(vid, pid));
        }
        backend
    }

    /// Attach a device at the end of the enumeration order
    pub fn plug(&self, device: MockDevice) -> Arc<MockDevice> {
        let device = Arc::new(device);
        self.devices.lock().push(Arc::clone(&device));
        device
    }

    /// Remove a device; further operations on it fail with `NoDevice`
    pub fn unplug(&self, device: &Arc<MockDevice>) {
        device.set_unplugged(true);
        self.devices.lock().retain(|d| !Arc::ptr_eq(d, device));
    }

    /// The plugged device with the given IDs, if any
    pub fn device(&self, vid: u16, pid: u16) -> Option<Arc<MockDevice>> {
        self.devices
            .lock()
            .iter()
            .find(|d| d.vid == vid && d.pid == pid)
            .cloned()
    }

    /// Make enumeration fail with `error` (or succeed again with `None`)
    pub fn fail_enumeration(&self, error: Option<rusb::Error>) {
        *self.enumeration_error.lock() = error;
    }
}

impl UsbBackend for MockBackend {
    fn devices(&self) -> Result<Vec<Arc<dyn UsbDevice>>, TransportError> {
        if let Some(error) = self.enumeration_error.lock().clone() {
            return Err(error.into());
        }
        Ok(self
            .devices
            .lock()
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn UsbDevice>)
            .collect())
    }
}
