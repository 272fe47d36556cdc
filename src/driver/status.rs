//! Connection status shown to callers
//!
//! The status is a state plus a short log of messages for that state.
//! Entering a new state starts a fresh log; repeating the last message is
//! a no-op so a device failing the same way every cycle does not flood it.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// Most messages kept for one state
pub const MAX_MESSAGES: usize = 32;

/// Connection state of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of the status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub messages: Vec<String>,
}

/// Live status owned by the driver
#[derive(Debug, Clone)]
pub struct Status {
    state: ConnectionState,
    messages: VecDeque<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

impl Status {
    /// Start out connecting, with no messages
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            messages: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Record `state`, optionally with a message.
    ///
    /// # Returns
    /// Whether anything changed
    pub fn set(&mut self, state: ConnectionState, message: Option<&str>) -> bool {
        if state != self.state {
            self.state = state;
            self.messages.clear();
            if let Some(message) = message {
                self.messages.push_back(message.to_string());
            }
            return true;
        }

        let Some(message) = message else {
            return false;
        };
        if self.messages.back().map(String::as_str) == Some(message) {
            return false;
        }

        self.messages.push_back(message.to_string());
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
        true
    }

    /// Most recent message for the current state
    pub fn last_message(&self) -> Option<&str> {
        self.messages.back().map(String::as_str)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            messages: self.messages.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let status = Status::new();
        assert_eq!(status.state(), ConnectionState::Connecting);
        assert!(status.snapshot().messages.is_empty());
    }

    #[test]
    fn test_repeated_message_is_ignored() {
        let mut status = Status::new();
        assert!(status.set(ConnectionState::Error, Some("timeout")));
        assert!(!status.set(ConnectionState::Error, Some("timeout")));
        assert!(status.set(ConnectionState::Error, Some("pipe error")));
        // Not consecutive, so appended again
        assert!(status.set(ConnectionState::Error, Some("timeout")));

        assert_eq!(
            status.snapshot().messages,
            vec!["timeout", "pipe error", "timeout"]
        );
    }

    #[test]
    fn test_state_change_resets_log() {
        let mut status = Status::new();
        status.set(ConnectionState::Error, Some("timeout"));
        status.set(ConnectionState::Error, Some("pipe error"));

        assert!(status.set(ConnectionState::Connecting, None));
        assert!(status.snapshot().messages.is_empty());

        status.set(ConnectionState::Connected, Some("Connected to PS60"));
        assert_eq!(status.snapshot().messages, vec!["Connected to PS60"]);
    }

    #[test]
    fn test_same_state_without_message() {
        let mut status = Status::new();
        assert!(!status.set(ConnectionState::Connecting, None));
    }

    #[test]
    fn test_log_is_capped() {
        let mut status = Status::new();
        for i in 0..(MAX_MESSAGES + 5) {
            status.set(ConnectionState::Error, Some(&format!("error {i}")));
        }
        let messages = status.snapshot().messages;
        assert_eq!(messages.len(), MAX_MESSAGES);
        assert_eq!(messages[0], "error 5");
        assert_eq!(status.last_message(), Some(format!("error {}", MAX_MESSAGES + 4).as_str()));
    }

    #[test]
    fn test_snapshot_serializes_lowercase_state() {
        let mut status = Status::new();
        status.set(ConnectionState::Disconnected, Some("Scale not found"));
        let json = serde_json::to_string(&status.snapshot()).unwrap();
        assert_eq!(json, r#"{"state":"disconnected","messages":["Scale not found"]}"#);
    }
}
