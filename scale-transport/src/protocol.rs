//! Protocol constants for the HID "Scale" usage page reports

/// Report type codes (byte 0 of every report)
pub mod report_type {
    pub const ATTRIBUTES: u8 = 0x01;
    pub const CONTROL: u8 = 0x02;
    pub const DATA: u8 = 0x03;
    pub const STATUS: u8 = 0x04;
    pub const WEIGHT_LIMIT: u8 = 0x05;
    pub const STATISTICS: u8 = 0x06;

    /// Get human-readable name for a report type byte
    pub fn name(code: u8) -> &'static str {
        match code {
            ATTRIBUTES => "ATTRIBUTES",
            CONTROL => "CONTROL",
            DATA => "DATA",
            STATUS => "STATUS",
            WEIGHT_LIMIT => "WEIGHT_LIMIT",
            STATISTICS => "STATISTICS",
            _ => "UNKNOWN",
        }
    }
}

/// Weight unit codes
pub mod unit {
    pub const MILLIGRAM: u8 = 0x01;
    pub const GRAM: u8 = 0x02;
    pub const KILOGRAM: u8 = 0x03;
    pub const CARAT: u8 = 0x04;
    pub const TAEL: u8 = 0x05;
    pub const GRAIN: u8 = 0x06;
    pub const PENNYWEIGHT: u8 = 0x07;
    pub const METRIC_TON: u8 = 0x08;
    pub const AVOIR_TON: u8 = 0x09;
    pub const TROY_OUNCE: u8 = 0x0A;
    pub const OUNCE: u8 = 0x0B;
    pub const POUND: u8 = 0x0C;
    /// Last code in the reserved block 0x0D..=0x0F
    pub const RESERVED_MAX: u8 = 0x0F;
}

/// Scale status codes
pub mod status {
    pub const FAULT: u8 = 0x01;
    pub const STABLE_AT_ZERO: u8 = 0x02;
    pub const IN_MOTION: u8 = 0x03;
    pub const WEIGHT_STABLE: u8 = 0x04;
    pub const UNDER_ZERO: u8 = 0x05;
    pub const OVER_WEIGHT_LIMIT: u8 = 0x06;
    pub const REQUIRES_CALIBRATION: u8 = 0x07;
    pub const REQUIRES_REZEROING: u8 = 0x08;
    /// Last code in the reserved block 0x09..=0x0F
    pub const RESERVED_MAX: u8 = 0x0F;
    /// Control acknowledgement: zero scale
    pub const ZERO_SCALE: u8 = 0x10;
    /// Control acknowledgement: enforced zero return
    pub const ENFORCED_ZERO_RETURN: u8 = 0x11;
}

/// Control report flag bits (byte 1 of a control report)
pub mod control {
    /// Enforced zero return (odd control byte)
    pub const ENFORCED_ZERO_RETURN: u8 = 0x01;
    /// Zero scale (control byte > 1)
    pub const ZERO_SCALE: u8 = 0x02;
}

/// HID class request constants used for output reports
pub mod hid {
    /// HID class request SET_REPORT
    pub const SET_REPORT: u8 = 0x09;
    /// Report type "Output" in the high byte of wValue
    pub const REPORT_TYPE_OUTPUT: u8 = 0x02;
    /// The scale's HID interface
    pub const INTERFACE: u8 = 0;
}

/// Report size for every scale report
pub const REPORT_SIZE: usize = 6;

/// Length of the "not ready yet" frame the scale emits between reports
pub const NOT_READY_LEN: usize = 2;

/// Retry and timeout defaults
pub mod timing {
    /// Attempts per `read` and outer attempts per `weigh`
    pub const DEFAULT_MAX_ATTEMPTS: usize = 10;
    /// Timeout of a single interrupt transfer (ms)
    pub const READ_TIMEOUT_MS: u64 = 1000;
    /// Timeout of a control transfer (ms)
    pub const CONTROL_TIMEOUT_MS: u64 = 1000;
}
