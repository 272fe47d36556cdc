//! HID scale report decoding
//!
//! The scale answers interrupt reads with 6-byte reports whose first byte is
//! the report type:
//!
//! ```text
//! 0x01 Attributes   [01, class, unit, ..]
//! 0x02 Control      [02, flags, ..]
//! 0x03 Data         [03, status, unit, exponent, lsb, msb]
//! 0x04 Status       [04, status, ..]
//! 0x05 WeightLimit  [05, unit, exponent, lsb, msb, ..]
//! 0x06 Statistics   [06, cal_lo, cal_hi, rezero_lo, rezero_hi, ..]
//! ```
//!
//! Between reports the scale emits a 2-byte "not ready" frame which is
//! filtered out by the session before it gets here.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::error::DecodeError;
use crate::protocol::{control, report_type, status, unit};

/// Physical weight unit reported by the scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightUnit {
    Milligram,
    Gram,
    Kilogram,
    Carat,
    Tael,
    Grain,
    Pennyweight,
    MetricTon,
    AvoirTon,
    TroyOunce,
    Ounce,
    Pound,
    /// Reserved codes 0x0D..=0x0F
    Reserved(u8),
}

impl WeightUnit {
    /// Decode a unit code, failing on anything outside 0x01..=0x0F
    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        let unit = match code {
            unit::MILLIGRAM => Self::Milligram,
            unit::GRAM => Self::Gram,
            unit::KILOGRAM => Self::Kilogram,
            unit::CARAT => Self::Carat,
            unit::TAEL => Self::Tael,
            unit::GRAIN => Self::Grain,
            unit::PENNYWEIGHT => Self::Pennyweight,
            unit::METRIC_TON => Self::MetricTon,
            unit::AVOIR_TON => Self::AvoirTon,
            unit::TROY_OUNCE => Self::TroyOunce,
            unit::OUNCE => Self::Ounce,
            unit::POUND => Self::Pound,
            0x0D..=unit::RESERVED_MAX => Self::Reserved(code),
            _ => return Err(DecodeError::UnknownUnit(code)),
        };
        Ok(unit)
    }

    /// Wire code of this unit
    pub fn code(&self) -> u8 {
        match self {
            Self::Milligram => unit::MILLIGRAM,
            Self::Gram => unit::GRAM,
            Self::Kilogram => unit::KILOGRAM,
            Self::Carat => unit::CARAT,
            Self::Tael => unit::TAEL,
            Self::Grain => unit::GRAIN,
            Self::Pennyweight => unit::PENNYWEIGHT,
            Self::MetricTon => unit::METRIC_TON,
            Self::AvoirTon => unit::AVOIR_TON,
            Self::TroyOunce => unit::TROY_OUNCE,
            Self::Ounce => unit::OUNCE,
            Self::Pound => unit::POUND,
            Self::Reserved(code) => *code,
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Milligram => "milligram",
            Self::Gram => "gram",
            Self::Kilogram => "kilogram",
            Self::Carat => "carat",
            Self::Tael => "tael",
            Self::Grain => "grain",
            Self::Pennyweight => "pennyweight",
            Self::MetricTon => "metric ton",
            Self::AvoirTon => "avoir ton",
            Self::TroyOunce => "troy ounce",
            Self::Ounce => "ounce",
            Self::Pound => "pound",
            Self::Reserved(code) => return write!(f, "reserved (0x{code:X})"),
        };
        f.write_str(name)
    }
}

impl Serialize for WeightUnit {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Scale status carried by data and status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleStatus {
    Fault,
    StableAtZero,
    InMotion,
    WeightStable,
    UnderZero,
    OverWeightLimit,
    RequiresCalibration,
    RequiresRezeroing,
    /// Reserved codes 0x09..=0x0F
    Reserved(u8),
    ZeroScale,
    EnforcedZeroReturn,
}

impl ScaleStatus {
    /// Decode a status code, failing on anything outside 0x01..=0x11
    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        let status = match code {
            status::FAULT => Self::Fault,
            status::STABLE_AT_ZERO => Self::StableAtZero,
            status::IN_MOTION => Self::InMotion,
            status::WEIGHT_STABLE => Self::WeightStable,
            status::UNDER_ZERO => Self::UnderZero,
            status::OVER_WEIGHT_LIMIT => Self::OverWeightLimit,
            status::REQUIRES_CALIBRATION => Self::RequiresCalibration,
            status::REQUIRES_REZEROING => Self::RequiresRezeroing,
            0x09..=status::RESERVED_MAX => Self::Reserved(code),
            status::ZERO_SCALE => Self::ZeroScale,
            status::ENFORCED_ZERO_RETURN => Self::EnforcedZeroReturn,
            _ => return Err(DecodeError::UnknownStatus(code)),
        };
        Ok(status)
    }

    /// Wire code of this status
    pub fn code(&self) -> u8 {
        match self {
            Self::Fault => status::FAULT,
            Self::StableAtZero => status::STABLE_AT_ZERO,
            Self::InMotion => status::IN_MOTION,
            Self::WeightStable => status::WEIGHT_STABLE,
            Self::UnderZero => status::UNDER_ZERO,
            Self::OverWeightLimit => status::OVER_WEIGHT_LIMIT,
            Self::RequiresCalibration => status::REQUIRES_CALIBRATION,
            Self::RequiresRezeroing => status::REQUIRES_REZEROING,
            Self::Reserved(code) => *code,
            Self::ZeroScale => status::ZERO_SCALE,
            Self::EnforcedZeroReturn => status::ENFORCED_ZERO_RETURN,
        }
    }

    /// A settled reading: "Weight Stable" or "Stable at Center of Zero"
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::WeightStable | Self::StableAtZero)
    }
}

impl fmt::Display for ScaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fault => "Fault",
            Self::StableAtZero => "Stable at Center of Zero",
            Self::InMotion => "In Motion",
            Self::WeightStable => "Weight Stable",
            Self::UnderZero => "Under Zero",
            Self::OverWeightLimit => "Over Weight Limit",
            Self::RequiresCalibration => "Requires Calibration",
            Self::RequiresRezeroing => "Requires Re-zeroing",
            Self::Reserved(code) => return write!(f, "Reserved (0x{code:X})"),
            Self::ZeroScale => "Zero Scale",
            Self::EnforcedZeroReturn => "Enforced Zero Return",
        };
        f.write_str(name)
    }
}

impl Serialize for ScaleStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Scale accuracy class from the attributes report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaleClass(u8);

impl ScaleClass {
    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        match code {
            0x01..=0x0F => Ok(Self(code)),
            _ => Err(DecodeError::UnknownScaleClass(code)),
        }
    }

    pub fn code(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ScaleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0x01 | 0x02 => "Scale Class I Metric",
            0x03 => "Scale Class II Metric",
            0x04 => "Scale Class III Metric",
            0x05 => "Scale Class IIIL Metric",
            0x06 => "Scale Class IV Metric",
            0x07 => "Scale Class III English",
            0x08 => "Scale Class IIIL English",
            0x09 => "Scale Class IV English",
            0x0A => "Scale Class Generic",
            // Reserved usages sit at 0x2B..=0x2F on the usage page
            code => return write!(f, "Reserved (0x{:X})", 0x20 + code),
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributesReport {
    pub raw: Vec<u8>,
    pub scale_class: ScaleClass,
    pub unit: WeightUnit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReport {
    pub raw: Vec<u8>,
    pub zero_scale: bool,
    pub enforced_zero_return: bool,
}

impl ControlReport {
    /// Build the outbound control report payload `[report id, flags]`
    pub fn encode(zero_scale: bool, enforced_zero_return: bool) -> [u8; 2] {
        let mut flags = 0;
        if zero_scale {
            flags |= control::ZERO_SCALE;
        }
        if enforced_zero_return {
            flags |= control::ENFORCED_ZERO_RETURN;
        }
        [report_type::CONTROL, flags]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataReport {
    #[serde(skip)]
    pub raw: Vec<u8>,
    pub status: ScaleStatus,
    pub unit: WeightUnit,
    pub weight: Decimal,
}

impl DataReport {
    /// Whether this reading may be cached as the current weight
    pub fn is_stable(&self) -> bool {
        self.status.is_stable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub raw: Vec<u8>,
    pub status: ScaleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightLimitReport {
    pub raw: Vec<u8>,
    pub unit: WeightUnit,
    pub weight: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsReport {
    pub raw: Vec<u8>,
    pub calibration_count: u16,
    pub rezero_count: u16,
}

/// A decoded scale report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Attributes(AttributesReport),
    Control(ControlReport),
    Data(DataReport),
    Status(StatusReport),
    WeightLimit(WeightLimitReport),
    Statistics(StatisticsReport),
}

impl Report {
    /// Raw bytes this report was decoded from
    pub fn raw(&self) -> &[u8] {
        match self {
            Report::Attributes(r) => &r.raw,
            Report::Control(r) => &r.raw,
            Report::Data(r) => &r.raw,
            Report::Status(r) => &r.raw,
            Report::WeightLimit(r) => &r.raw,
            Report::Statistics(r) => &r.raw,
        }
    }

    /// Report type byte
    pub fn type_code(&self) -> u8 {
        match self {
            Report::Attributes(_) => report_type::ATTRIBUTES,
            Report::Control(_) => report_type::CONTROL,
            Report::Data(_) => report_type::DATA,
            Report::Status(_) => report_type::STATUS,
            Report::WeightLimit(_) => report_type::WEIGHT_LIMIT,
            Report::Statistics(_) => report_type::STATISTICS,
        }
    }

    /// The data report if this is one and it carries a settled weight
    pub fn into_stable_data(self) -> Option<DataReport> {
        match self {
            Report::Data(data) if data.is_stable() => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Attributes(r) => write!(f, "Attributes: {}, {}", r.scale_class, r.unit),
            Report::Control(r) => write!(
                f,
                "Control: zero_scale={} enforced_zero_return={}",
                r.zero_scale, r.enforced_zero_return
            ),
            Report::Data(r) => write!(f, "Data: {} {} ({})", r.weight, r.unit, r.status),
            Report::Status(r) => write!(f, "Status: {}", r.status),
            Report::WeightLimit(r) => write!(f, "Weight limit: {} {}", r.weight, r.unit),
            Report::Statistics(r) => write!(
                f,
                "Statistics: {} calibrations, {} re-zeroings",
                r.calibration_count, r.rezero_count
            ),
        }
    }
}

/// Minimum frame length each report type needs
fn required_len(code: u8) -> usize {
    match code {
        report_type::ATTRIBUTES => 3,
        report_type::CONTROL | report_type::STATUS => 2,
        report_type::DATA => 6,
        report_type::WEIGHT_LIMIT | report_type::STATISTICS => 5,
        _ => 1,
    }
}

/// Decode a raw report frame
pub fn decode(raw: &[u8]) -> Result<Report, DecodeError> {
    let Some(&code) = raw.first() else {
        return Err(DecodeError::Truncated {
            expected: 1,
            actual: 0,
        });
    };

    let expected = required_len(code);
    if raw.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: raw.len(),
        });
    }

    let report = match code {
        report_type::ATTRIBUTES => Report::Attributes(AttributesReport {
            raw: raw.to_vec(),
            scale_class: ScaleClass::from_code(raw[1])?,
            unit: WeightUnit::from_code(raw[2])?,
        }),
        report_type::CONTROL => Report::Control(ControlReport {
            raw: raw.to_vec(),
            zero_scale: raw[1] > 1,
            enforced_zero_return: raw[1] % 2 == 1,
        }),
        report_type::DATA => Report::Data(DataReport {
            raw: raw.to_vec(),
            status: ScaleStatus::from_code(raw[1])?,
            unit: WeightUnit::from_code(raw[2])?,
            weight: calc_weight(raw[3], raw[4], raw[5])?,
        }),
        report_type::STATUS => Report::Status(StatusReport {
            raw: raw.to_vec(),
            status: ScaleStatus::from_code(raw[1])?,
        }),
        report_type::WEIGHT_LIMIT => Report::WeightLimit(WeightLimitReport {
            raw: raw.to_vec(),
            unit: WeightUnit::from_code(raw[1])?,
            weight: calc_weight(raw[2], raw[3], raw[4])?,
        }),
        report_type::STATISTICS => Report::Statistics(StatisticsReport {
            raw: raw.to_vec(),
            calibration_count: u16::from_le_bytes([raw[1], raw[2]]),
            rezero_count: u16::from_le_bytes([raw[3], raw[4]]),
        }),
        other => return Err(DecodeError::UnknownReportType(other)),
    };

    Ok(report)
}

/// Interpret `value` as two's complement over its own bit length.
///
/// The width is the number of significant bits of the unsigned value, not a
/// fixed 8 bits: 0xFE is 8 bits wide and reads as -2, 0x03 is 2 bits wide
/// and reads as -1. Zero stays zero.
pub fn twos_comp(value: u8) -> i32 {
    if value == 0 {
        return 0;
    }
    let bits = u8::BITS - value.leading_zeros();
    let value = i32::from(value);
    if value & (1 << (bits - 1)) != 0 {
        value - (1 << bits)
    } else {
        value
    }
}

/// Compute `10^exponent * (lsb + 256 * msb)` in decimal arithmetic
pub fn calc_weight(exponent: u8, lsb: u8, msb: u8) -> Result<Decimal, DecodeError> {
    let mantissa = i64::from(lsb) + 256 * i64::from(msb);
    let power = twos_comp(exponent);

    if power >= 0 {
        let factor = 10i64
            .checked_pow(power.unsigned_abs())
            .ok_or(DecodeError::ExponentOutOfRange(exponent))?;
        return Ok(Decimal::from(mantissa * factor));
    }

    Decimal::try_from_i128_with_scale(i128::from(mantissa), power.unsigned_abs())
        .map_err(|_| DecodeError::ExponentOutOfRange(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_calc_weight_recorded_samples() {
        // Frames recorded from a Mettler Toledo PS60
        assert_eq!(calc_weight(0xFE, 0, 0).unwrap(), Decimal::ZERO);
        assert_eq!(calc_weight(0xFE, 254, 1).unwrap(), dec("5.10"));
        assert_eq!(calc_weight(0xFE, 194, 0).unwrap(), dec("1.94"));
        assert_eq!(calc_weight(0x03, 0, 0).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_calc_weight_bit_length_exponent() {
        // 0x03 is two bits wide, so it reads as -1 rather than +3
        assert_eq!(calc_weight(0x03, 194, 0).unwrap(), dec("19.4"));
        assert_eq!(calc_weight(0x00, 194, 0).unwrap(), dec("194"));
        assert_eq!(calc_weight(0xFF, 10, 0).unwrap(), dec("1.0"));
    }

    #[test]
    fn test_calc_weight_is_decimal_exact() {
        let w = calc_weight(0xFE, 0x0A, 0x00).unwrap();
        let sum: Decimal = (0..10).map(|_| w).sum();
        assert_eq!(sum, Decimal::ONE);
    }

    #[test]
    fn test_calc_weight_exponent_out_of_range() {
        // 0x80 reads as -128, beyond the 28-digit decimal scale
        assert_eq!(
            calc_weight(0x80, 1, 0),
            Err(DecodeError::ExponentOutOfRange(0x80))
        );
    }

    #[test]
    fn test_twos_comp() {
        assert_eq!(twos_comp(0x00), 0);
        assert_eq!(twos_comp(0x01), -1);
        assert_eq!(twos_comp(0x02), -2);
        assert_eq!(twos_comp(0x03), -1);
        assert_eq!(twos_comp(0xFE), -2);
        assert_eq!(twos_comp(0xFF), -1);
    }

    #[test]
    fn test_decode_data_report() {
        let report = decode(&[3, 4, 3, 254, 194, 0]).unwrap();
        match report {
            Report::Data(data) => {
                assert_eq!(data.status, ScaleStatus::WeightStable);
                assert_eq!(data.unit, WeightUnit::Kilogram);
                assert_eq!(data.weight, dec("1.94"));
                assert_eq!(data.raw, vec![3, 4, 3, 254, 194, 0]);
                assert!(data.is_stable());
            }
            other => panic!("Expected Data report, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_zero_pound() {
        let report = decode(&[3, 2, 12, 254, 0, 0]).unwrap();
        let data = report.into_stable_data().expect("stable at zero");
        assert_eq!(data.status, ScaleStatus::StableAtZero);
        assert_eq!(data.unit, WeightUnit::Pound);
        assert_eq!(data.weight, Decimal::ZERO);
    }

    #[test]
    fn test_in_motion_is_not_stable() {
        let report = decode(&[3, 3, 3, 254, 100, 0]).unwrap();
        assert!(report.into_stable_data().is_none());
    }

    #[test]
    fn test_decode_attributes() {
        let report = decode(&[1, 0x0A, 0x0C, 0, 0, 0]).unwrap();
        match report {
            Report::Attributes(attr) => {
                assert_eq!(attr.scale_class.to_string(), "Scale Class Generic");
                assert_eq!(attr.unit, WeightUnit::Pound);
            }
            other => panic!("Expected Attributes report, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_control_flags() {
        let flags = |byte: u8| match decode(&[2, byte, 0, 0, 0, 0]).unwrap() {
            Report::Control(c) => (c.zero_scale, c.enforced_zero_return),
            other => panic!("Expected Control report, got {other:?}"),
        };
        assert_eq!(flags(0), (false, false));
        assert_eq!(flags(1), (false, true));
        assert_eq!(flags(2), (true, false));
        assert_eq!(flags(3), (true, true));
    }

    #[test]
    fn test_control_encode_matches_decode() {
        let payload = ControlReport::encode(true, false);
        assert_eq!(payload, [0x02, 0x02]);
    }

    #[test]
    fn test_decode_status_and_weight_limit() {
        match decode(&[4, 0x03, 0, 0, 0, 0]).unwrap() {
            Report::Status(s) => assert_eq!(s.status, ScaleStatus::InMotion),
            other => panic!("Expected Status report, got {other:?}"),
        }
        match decode(&[5, 0x0C, 0xFF, 0xE8, 0x03, 0]).unwrap() {
            Report::WeightLimit(w) => {
                assert_eq!(w.unit, WeightUnit::Pound);
                assert_eq!(w.weight, dec("100.0"));
            }
            other => panic!("Expected WeightLimit report, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_statistics_little_endian() {
        match decode(&[6, 0x01, 0x02, 0xFF, 0x00, 0]).unwrap() {
            Report::Statistics(s) => {
                assert_eq!(s.calibration_count, 0x0201);
                assert_eq!(s.rezero_count, 0x00FF);
            }
            other => panic!("Expected Statistics report, got {other:?}"),
        }
    }

    #[test]
    fn test_every_defined_unit_code_decodes() {
        for code in 0x01..=0x0Fu8 {
            let unit = WeightUnit::from_code(code).unwrap();
            assert_eq!(unit.code(), code);
            assert!(!unit.to_string().is_empty());
        }
        assert_eq!(WeightUnit::from_code(0x0C).unwrap().to_string(), "pound");
        assert_eq!(
            WeightUnit::from_code(0x0D).unwrap().to_string(),
            "reserved (0xD)"
        );
    }

    #[test]
    fn test_every_defined_status_code_decodes() {
        for code in 0x01..=0x11u8 {
            let status = ScaleStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(ScaleStatus::WeightStable.to_string(), "Weight Stable");
        assert_eq!(
            ScaleStatus::StableAtZero.to_string(),
            "Stable at Center of Zero"
        );
        assert_eq!(ScaleStatus::from_code(0x11).unwrap().to_string(), "Enforced Zero Return");
    }

    #[test]
    fn test_undefined_codes_fail() {
        assert_eq!(decode(&[0, 0, 0, 0, 0, 0]), Err(DecodeError::UnknownReportType(0)));
        assert_eq!(decode(&[7, 0, 0, 0, 0, 0]), Err(DecodeError::UnknownReportType(7)));
        assert_eq!(decode(&[3, 0x12, 3, 0, 0, 0]), Err(DecodeError::UnknownStatus(0x12)));
        assert_eq!(decode(&[3, 0x00, 3, 0, 0, 0]), Err(DecodeError::UnknownStatus(0)));
        assert_eq!(decode(&[3, 4, 0x10, 0, 0, 0]), Err(DecodeError::UnknownUnit(0x10)));
        assert_eq!(decode(&[5, 0x00, 0, 0, 0, 0]), Err(DecodeError::UnknownUnit(0)));
        assert_eq!(decode(&[1, 0x10, 3, 0, 0, 0]), Err(DecodeError::UnknownScaleClass(0x10)));
    }

    #[test]
    fn test_truncated_frames_fail() {
        assert_eq!(
            decode(&[3, 4, 3]),
            Err(DecodeError::Truncated {
                expected: 6,
                actual: 3
            })
        );
        assert_eq!(
            decode(&[]),
            Err(DecodeError::Truncated {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn test_data_report_serializes_with_names() {
        let data = decode(&[3, 4, 3, 254, 194, 0])
            .unwrap()
            .into_stable_data()
            .unwrap();
        assert_eq!(data.unit.to_string(), "kilogram");
        assert_eq!(data.status.to_string(), "Weight Stable");
    }
}
