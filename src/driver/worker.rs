//! Worker thread running the connection state machine
//!
//! ```text
//! Connecting --found, connected--> Connected --weigh error--> Error
//!     ^  |                            |  ^                      |
//!     |  +--not found (backoff)       +--+ poll interval        |
//!     +-------------------------- backoff ----------------------+
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scale_transport::TransportError;
use tracing::{debug, error, info, warn};

use super::{ConnectionState, Shared};

/// Longest uninterrupted sleep, so shutdown is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(50);

enum LoopState {
    Connecting,
    Connected,
    Error(TransportError),
}

/// Run the state machine until shutdown
pub(crate) fn run(shared: Arc<Shared>) {
    info!("Scale worker started");
    let mut state = LoopState::Connecting;

    while !shared.is_shutdown() {
        state = match state {
            LoopState::Connecting => connecting(&shared),
            LoopState::Connected => connected(&shared),
            LoopState::Error(e) => error_state(&shared, e),
        };
    }

    if let Err(e) = shared.session.lock().disconnect() {
        debug!("Disconnect on shutdown: {}", e);
    }
    info!("Scale worker stopped");
}

fn connecting(shared: &Shared) -> LoopState {
    let found = match shared.registry.select(&shared.config.device) {
        Ok(Some(found)) => found,
        Ok(None) => {
            let message = format!("{} not found", shared.config.device.label());
            shared.update(|s| {
                if s.status.set(ConnectionState::Disconnected, Some(&message)) {
                    info!("{}", message);
                }
                s.device = None;
            });
            sleep_unless_shutdown(shared, shared.config.backoff());
            return LoopState::Connecting;
        }
        Err(e) => return LoopState::Error(e),
    };

    let name = found.descriptor.name();
    shared.update(|s| {
        s.status
            .set(ConnectionState::Connecting, Some(&format!("Connecting to {name}")));
        s.device = Some(found.descriptor.clone());
    });

    let mut session = shared.session.lock();
    session.bind(Some(found));
    match session.connect() {
        Ok(true) => {
            shared.update(|s| {
                s.status
                    .set(ConnectionState::Connected, Some(&format!("Connected to {name}")))
            });
            LoopState::Connected
        }
        Ok(false) => LoopState::Error(TransportError::NotConnected),
        Err(e) => LoopState::Error(e),
    }
}

fn connected(shared: &Shared) -> LoopState {
    if shared.zero_requested.swap(false, Ordering::SeqCst) {
        if let Err(e) = shared.session.lock().zero() {
            warn!("Zero request failed: {}", e);
            shared.update(|s| {
                s.status
                    .set(ConnectionState::Connected, Some(&format!("Zero failed: {e}")))
            });
        }
    }

    let result = shared
        .session
        .lock()
        .weigh(None, shared.config.max_attempts);

    match result {
        Ok(Some(data)) => {
            debug!("Stable reading: {} {}", data.weight, data.unit);
            shared.update(|s| s.reading = Some(data));
        }
        Ok(None) => debug!("No stable weight yet"),
        Err(e) => return LoopState::Error(e),
    }

    sleep_unless_shutdown(shared, shared.config.poll_interval());
    LoopState::Connected
}

fn error_state(shared: &Shared, e: TransportError) -> LoopState {
    let message = e.to_string();
    if e.is_decode() {
        error!("Protocol mismatch: {}", message);
    } else {
        warn!("Scale error: {}", message);
    }

    shared.update(|s| {
        s.status.set(ConnectionState::Error, Some(&message));
        s.device = None;
    });

    if let Err(e) = shared.session.lock().disconnect() {
        debug!("Disconnect after error: {}", e);
    }

    sleep_unless_shutdown(shared, shared.config.backoff());
    LoopState::Connecting
}

/// Sleep for `duration`, waking early on shutdown
fn sleep_unless_shutdown(shared: &Shared, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !shared.is_shutdown() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
