//! Offline commands: report decoding and config display

use anyhow::{anyhow, bail};
use scale_driver::DriverConfig;
use scale_transport::protocol::{report_type, NOT_READY_LEN};

use super::CommandResult;

/// Decode a hex-encoded report and print it
pub fn decode(hex: &str) -> CommandResult {
    let bytes = parse_hex_bytes(hex)?;

    if bytes.len() <= NOT_READY_LEN {
        println!("Not ready frame {bytes:02x?} (skipped by readers)");
        return Ok(());
    }

    let report = scale_transport::decode(&bytes)
        .map_err(|e| anyhow!("{} report {:02x?}: {}", report_type::name(bytes[0]), bytes, e))?;
    println!("{report}");
    Ok(())
}

/// Print the effective configuration
pub fn config(config: &DriverConfig) -> CommandResult {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Parse "03 04 0c fe fe 01", "03:04:0c" or "03040cfefe01"
fn parse_hex_bytes(input: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .map(|part| part.trim_start_matches("0x"))
        .collect();

    if digits.is_empty() {
        bail!("no report bytes given");
    }
    if !digits.is_ascii() {
        bail!("invalid hex in '{input}'");
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in '{input}'");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| anyhow!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}
