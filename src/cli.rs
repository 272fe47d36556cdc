// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scale-driver")]
#[command(author, version, about = "USB HID scale driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/scale-driver/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Select the scale by USB vendor ID (hex, e.g. 0eb8)
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    pub vendor_id: Option<u16>,

    /// Select the scale by USB product ID (hex, e.g. f000)
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    pub product_id: Option<u16>,

    /// Select the scale by manufacturer name (exact match)
    #[arg(long, global = true)]
    pub manufacturer: Option<String>,

    /// Select the scale by model name (exact match)
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List USB devices with their resolved names
    #[command(visible_alias = "ls")]
    List,

    /// Weigh once and print the settled weight
    Read {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Reports taken before giving up on a settled weight (default: from config)
        #[arg(short, long)]
        attempts: Option<usize>,
    },

    /// Keep the scale connected and print readings until Ctrl+C
    Watch {
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Decode a raw report given as hex (e.g. "03 04 0c fe fe 01")
    Decode {
        /// Report bytes
        hex: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Parse a 16-bit USB ID written in hex, with or without "0x"
pub fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB ID '{s}': {e}"))
}
