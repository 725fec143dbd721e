//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use zc_bus_probe::serial::DEFAULT_BAUD_RATE;

/// CAN interface used when none is given.
pub const DEFAULT_CAN_INTERFACE: &str = "can0";

#[derive(Debug, Parser)]
#[command(name = "zc-prober")]
#[command(version, about = "Probe a CAN bus or serial device for undocumented IDs and commands")]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML file with scan overrides (cadence, command list, delays)
    #[arg(short, long, env = "ZC_PROBER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Debug diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit diagnostics as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print the final result as a JSON object
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send remote frames across a range of standard CAN IDs
    Can(CanArgs),

    /// Send text commands to a serial device and log the replies
    Serial(SerialArgs),
}

#[derive(Debug, Args)]
pub struct CanArgs {
    /// CAN interface name
    #[arg(short, long, default_value = DEFAULT_CAN_INTERFACE)]
    pub interface: String,

    /// First CAN ID (hex)
    #[arg(long, default_value = "0x000", value_parser = parse_hex_bound, allow_hyphen_values = true)]
    pub start: i64,

    /// Last CAN ID, inclusive (hex)
    #[arg(long, default_value = "0x7FF", value_parser = parse_hex_bound, allow_hyphen_values = true)]
    pub end: i64,

    /// Data length code requested by each remote frame (0-8)
    #[arg(long, visible_alias = "data-length-code", default_value_t = 8)]
    pub dlc: u8,

    /// Delay after each frame, in seconds
    #[arg(long, visible_alias = "delay-seconds", default_value_t = 0.01, allow_hyphen_values = true)]
    pub delay: f64,

    /// Record received frames to this file while scanning
    #[arg(long)]
    pub capture: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SerialArgs {
    /// Serial device path (e.g. /dev/ttyUSB0)
    pub device: String,

    /// Line speed
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Reply log path [default: serial_probe_<timestamp>.log]
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Do not record replies
    #[arg(long)]
    pub no_capture: bool,
}

/// Parse a hex CAN ID bound: `7FF`, `0x7ff`, or negative like `-0x1`.
///
/// Negative values parse so that range validation can reject them with a
/// proper message.
pub fn parse_hex_bound(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("'{s}' is not a hex number"));
    }
    let value = i64::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is out of range: {e}"))?;
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bounds() {
        assert_eq!(parse_hex_bound("0x7FF"), Ok(0x7FF));
        assert_eq!(parse_hex_bound("0x7ff"), Ok(0x7FF));
        assert_eq!(parse_hex_bound("7FF"), Ok(0x7FF));
        assert_eq!(parse_hex_bound("0X010"), Ok(0x10));
        assert_eq!(parse_hex_bound("000"), Ok(0));
        assert_eq!(parse_hex_bound("-0x1"), Ok(-1));
        assert_eq!(parse_hex_bound(" 0x12 "), Ok(0x12));
    }

    #[test]
    fn bad_hex_bounds() {
        assert!(parse_hex_bound("").is_err());
        assert!(parse_hex_bound("0x").is_err());
        assert!(parse_hex_bound("0xZZ").is_err());
        assert!(parse_hex_bound("--1").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
