//! Transport error types

use thiserror::Error;

/// Errors raised while decoding a raw scale report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown report type 0x{0:02X}")]
    UnknownReportType(u8),

    #[error("Unknown weight unit 0x{0:02X}")]
    UnknownUnit(u8),

    #[error("Unknown scale status 0x{0:02X}")]
    UnknownStatus(u8),

    #[error("Unknown scale class 0x{0:02X}")]
    UnknownScaleClass(u8),

    #[error("Truncated report: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Weight exponent 0x{0:02X} is out of the representable range")]
    ExponentOutOfRange(u8),
}

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("No device bound to the session")]
    NotConnected,

    #[error("Read failed after {attempts} attempts: {source}")]
    Read {
        attempts: usize,
        #[source]
        source: Box<TransportError>,
    },

    #[error("Connection lost: {0}")]
    Connection(String),

    #[error("Protocol mismatch: {0}")]
    Decode(#[from] DecodeError),

    #[error("Operation not supported on this platform: {0}")]
    PlatformUnsupported(String),

    #[error("USB error: {0}")]
    Usb(rusb::Error),
}

impl TransportError {
    /// Check whether this error (or the error it wraps) is a decode failure
    pub fn is_decode(&self) -> bool {
        match self {
            TransportError::Decode(_) => true,
            TransportError::Read { source, .. } => source.is_decode(),
            _ => false,
        }
    }

    /// Check whether this error means the platform lacks the operation
    pub fn is_platform_unsupported(&self) -> bool {
        matches!(self, TransportError::PlatformUnsupported(_))
    }
}

impl From<rusb::Error> for TransportError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::NotSupported => TransportError::PlatformUnsupported(e.to_string()),
            other => TransportError::Usb(other),
        }
    }
}
