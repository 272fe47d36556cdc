//! Scale session - one claimed connection to a physical scale
//!
//! A session is bound to at most one device. `connect()` takes the HID
//! interface away from the kernel driver and claims it, `disconnect()`
//! hands it back. Reads skip the 2-byte "not ready" frames the scale emits
//! between reports.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device_registry::{DeviceFilter, DeviceRegistry};
use crate::error::TransportError;
use crate::protocol::{hid, timing, NOT_READY_LEN};
use crate::report::{decode, ControlReport, DataReport, Report};
use crate::types::{DeviceDescriptor, DiscoveredDevice, Endpoint};

/// Connection to one scale
pub struct ScaleSession {
    bound: Option<DiscoveredDevice>,
    read_timeout: Duration,
    connected: bool,
    /// Kernel driver was detached by `connect()` and must be reattached
    reattach: bool,
}

impl ScaleSession {
    /// Create a session bound to `device` (or to nothing)
    pub fn new(device: Option<DiscoveredDevice>) -> Self {
        Self {
            bound: device,
            read_timeout: Duration::from_millis(timing::READ_TIMEOUT_MS),
            connected: false,
            reattach: false,
        }
    }

    /// Bind a session to the first device matching `filter`
    pub fn find(registry: &DeviceRegistry, filter: &DeviceFilter) -> Result<Self, TransportError> {
        registry
            .select(filter)?
            .map(|found| Self::new(Some(found)))
            .ok_or_else(|| TransportError::DeviceNotFound(format!("{} not found", filter.label())))
    }

    /// Set the timeout of a single interrupt transfer
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Rebind to another device. Call `disconnect()` first.
    pub fn bind(&mut self, device: Option<DiscoveredDevice>) {
        if self.connected {
            warn!("Rebinding a session that is still connected");
        }
        self.bound = device;
        self.connected = false;
        self.reattach = false;
    }

    /// Descriptor of the bound device
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.bound.as_ref().map(|d| &d.descriptor)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Claim the scale's HID interface.
    ///
    /// # Returns
    /// `Ok(false)` when no device is bound, `Ok(true)` once claimed
    pub fn connect(&mut self) -> Result<bool, TransportError> {
        let Some(found) = self.bound.clone() else {
            return Ok(false);
        };
        let device = &found.device;

        match device.kernel_driver_active(hid::INTERFACE) {
            Ok(true) => match device.detach_kernel_driver(hid::INTERFACE) {
                Ok(()) => {
                    debug!("Detached kernel driver from {}", found.descriptor);
                    self.reattach = true;
                }
                Err(e) if e.is_platform_unsupported() => {
                    debug!("Kernel driver detach unsupported: {}", e);
                }
                Err(e) => return Err(e),
            },
            Ok(false) => {}
            Err(e) if e.is_platform_unsupported() => {
                debug!("Kernel driver query unsupported: {}", e);
            }
            Err(e) => return Err(e),
        }

        device.set_configuration()?;
        self.connected = true;
        info!("Connected to {}", found.descriptor);
        Ok(true)
    }

    /// Reset the device, release the interface and reattach the kernel
    /// driver if `connect()` detached it.
    ///
    /// # Returns
    /// `Ok(false)` when there was nothing to undo
    pub fn disconnect(&mut self) -> Result<bool, TransportError> {
        if !self.connected && !self.reattach {
            return Ok(false);
        }
        let Some(found) = self.bound.clone() else {
            return Ok(false);
        };
        let device = &found.device;
        self.connected = false;

        let reset = device.reset();
        if let Err(e) = device.release_interface(hid::INTERFACE) {
            debug!("Release of interface {} failed: {}", hid::INTERFACE, e);
        }

        // The kernel driver can only take the interface back once released,
        // and must be reattached before the handle is closed
        if std::mem::take(&mut self.reattach) {
            match device.attach_kernel_driver(hid::INTERFACE) {
                Ok(()) => debug!("Reattached kernel driver to {}", found.descriptor),
                Err(e) if e.is_platform_unsupported() => {
                    debug!("Kernel driver attach unsupported: {}", e);
                }
                Err(e) => warn!("Failed to reattach kernel driver: {}", e),
            }
        }
        device.dispose();

        reset?;
        info!("Disconnected from {}", found.descriptor);
        Ok(true)
    }

    /// Read one report, skipping "not ready" frames.
    ///
    /// Uses the device's first endpoint when `endpoint` is `None`.
    ///
    /// # Returns
    /// `Ok(None)` when the attempts only produced "not ready" frames
    pub fn read(
        &self,
        endpoint: Option<&Endpoint>,
        max_attempts: usize,
    ) -> Result<Option<Report>, TransportError> {
        let found = self.bound.as_ref().ok_or(TransportError::NotConnected)?;
        let endpoint = match endpoint {
            Some(ep) => *ep,
            None => found.device.default_endpoint()?,
        };

        let mut last_error = None;
        let mut got_frame = false;

        for attempt in 1..=max_attempts {
            match found.device.read(&endpoint, self.read_timeout) {
                Ok(frame) if frame.len() <= NOT_READY_LEN => {
                    debug!("Attempt {}/{}: not ready {:02x?}", attempt, max_attempts, frame);
                    got_frame = true;
                }
                Ok(frame) => {
                    debug!("Attempt {}/{}: frame {:02x?}", attempt, max_attempts, frame);
                    return Ok(Some(decode(&frame)?));
                }
                Err(e) => {
                    debug!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) if !got_frame => Err(TransportError::Read {
                attempts: max_attempts,
                source: Box::new(source),
            }),
            _ => Ok(None),
        }
    }

    /// Read until the scale reports a settled weight.
    ///
    /// `max_attempts` bounds the number of reports taken; each of them is a
    /// full `read` with the default attempt count. A `read` that yields no
    /// report at all means the scale went away and fails with
    /// `TransportError::Connection`. Running out of attempts while the
    /// weight is still moving returns `Ok(None)`.
    pub fn weigh(
        &self,
        endpoint: Option<&Endpoint>,
        max_attempts: usize,
    ) -> Result<Option<DataReport>, TransportError> {
        for attempt in 1..=max_attempts {
            let Some(report) = self.read(endpoint, timing::DEFAULT_MAX_ATTEMPTS)? else {
                let name = self
                    .descriptor()
                    .map(|d| d.name())
                    .unwrap_or_else(|| "Scale".to_string());
                return Err(TransportError::Connection(format!("{name} not found")));
            };

            match report {
                Report::Data(data) if data.is_stable() => return Ok(Some(data)),
                other => debug!("Weigh attempt {}/{}: {}", attempt, max_attempts, other),
            }
        }
        Ok(None)
    }

    /// Ask the scale to zero itself (Control report, zero-scale bit set)
    pub fn zero(&self) -> Result<(), TransportError> {
        let found = self.bound.as_ref().ok_or(TransportError::NotConnected)?;
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let report = ControlReport::encode(true, false);
        found
            .device
            .write_report(&report, Duration::from_millis(timing::CONTROL_TIMEOUT_MS))?;
        info!("Sent zero request to {}", found.descriptor);
        Ok(())
    }

    /// Connect and wrap the session in a guard that disconnects on drop
    pub fn scoped(mut self) -> Result<ScopedSession, TransportError> {
        match self.connect() {
            Ok(true) => Ok(ScopedSession { session: self }),
            Ok(false) => Err(TransportError::NotConnected),
            Err(e) => {
                // Undo a partial connect (detached kernel driver)
                if let Err(cleanup) = self.disconnect() {
                    debug!("Cleanup after failed connect: {}", cleanup);
                }
                Err(e)
            }
        }
    }
}

/// A connected session that disconnects when dropped
pub struct ScopedSession {
    session: ScaleSession,
}

impl Deref for ScopedSession {
    type Target = ScaleSession;

    fn deref(&self) -> &ScaleSession {
        &self.session
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut ScaleSession {
        &mut self.session
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect() {
            warn!("Disconnect on drop failed: {}", e);
        }
    }
}
