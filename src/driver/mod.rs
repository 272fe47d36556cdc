//! Scale driver - background polling with cached readings
//!
//! A `ScaleDriver` owns one worker thread that finds the scale, keeps it
//! connected and weighs it every poll interval. Callers only ever touch
//! the cached state: accessors never perform USB I/O and never report
//! hardware faults as errors. They see "no reading" plus a status instead.
//!
//! Locks:
//! - cache lock (`Shared::state`): held only to read or write the cache
//! - hardware lock (`Shared::session`): held by the worker around USB I/O
//! - start lock (`ScaleDriver::worker`): serializes `ensure_started`

mod status;
mod worker;

pub use status::{ConnectionState, Status, StatusSnapshot, MAX_MESSAGES};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use scale_transport::{
    DataReport, DeviceDescriptor, DeviceRegistry, RusbBackend, ScaleSession, ScaleStatus,
    TransportError, UsbBackend, WeightUnit,
};
use serde::Serialize;
use tracing::{error, info};

use crate::config::DriverConfig;

/// A tared weight as handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightReading {
    pub weight: Decimal,
    pub unit: WeightUnit,
    pub status: ScaleStatus,
}

/// Mutable state shared between the worker and the accessors
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Device the worker is bound to
    pub device: Option<DeviceDescriptor>,
    pub tare: Decimal,
    /// Last stable data report, untared
    pub reading: Option<DataReport>,
    pub status: Status,
}

pub(crate) struct Shared {
    pub config: DriverConfig,
    pub registry: DeviceRegistry,
    pub state: Mutex<SessionState>,
    pub session: Mutex<ScaleSession>,
    pub zero_requested: AtomicBool,
    pub shutdown: AtomicBool,
}

impl Shared {
    /// Run `f` under the cache lock
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Reconnect-tolerant driver for one USB HID scale
pub struct ScaleDriver {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScaleDriver {
    /// Create a driver that talks to real hardware through libusb
    pub fn new(config: DriverConfig) -> Result<Self, TransportError> {
        let backend = RusbBackend::new()?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Create a driver over any USB backend.
    ///
    /// The worker is not started until the first accessor call.
    pub fn with_backend(config: DriverConfig, backend: Arc<dyn UsbBackend>) -> Self {
        let registry = DeviceRegistry::new(backend, Arc::new(config.lookup_table()));
        let session = ScaleSession::new(None).with_read_timeout(config.read_timeout());

        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                state: Mutex::new(SessionState::default()),
                session: Mutex::new(session),
                zero_requested: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the worker unless it is already running.
    ///
    /// # Returns
    /// Whether a worker is running
    pub fn ensure_started(&self) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return true;
        }
        if self.shared.is_shutdown() {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        match std::thread::Builder::new()
            .name("scale-worker".into())
            .spawn(move || worker::run(shared))
        {
            Ok(handle) => {
                *worker = Some(handle);
                true
            }
            Err(e) => {
                error!("Failed to spawn scale worker thread: {}", e);
                false
            }
        }
    }

    /// Current weight minus tare, if a stable reading exists
    pub fn get_weight(&self) -> Option<Decimal> {
        self.read_weight().map(|r| r.weight)
    }

    /// Current tared reading with unit and status
    pub fn read_weight(&self) -> Option<WeightReading> {
        self.ensure_started();
        let state = self.shared.state.lock();
        state.reading.as_ref().map(|r| WeightReading {
            weight: r.weight - state.tare,
            unit: r.unit,
            status: r.status,
        })
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.ensure_started();
        self.shared.state.lock().status.snapshot()
    }

    /// Device the worker is currently bound to
    pub fn device(&self) -> Option<DeviceDescriptor> {
        self.ensure_started();
        self.shared.state.lock().device.clone()
    }

    pub fn tare(&self) -> Decimal {
        self.shared.state.lock().tare
    }

    /// Use the current reading as the tare offset.
    ///
    /// # Returns
    /// The new offset, or `None` (offset unchanged) without a reading
    pub fn set_tare(&self) -> Option<Decimal> {
        self.ensure_started();
        let mut state = self.shared.state.lock();
        let weight = state.reading.as_ref()?.weight;
        state.tare = weight;
        info!("Tare set to {}", weight);
        Some(weight)
    }

    pub fn clear_tare(&self) {
        self.ensure_started();
        self.shared.state.lock().tare = Decimal::ZERO;
        info!("Tare cleared");
    }

    /// Ask the scale to zero itself. Sent by the worker on its next cycle
    /// while connected.
    pub fn zero(&self) {
        self.ensure_started();
        self.shared.zero_requested.store(true, Ordering::SeqCst);
    }

    /// Stop the worker and wait for it to release the device
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // Join outside the start lock so accessors are not held up by the
        // worker's last transfer
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Scale worker panicked");
            }
        }
    }
}

impl Drop for ScaleDriver {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }
}
