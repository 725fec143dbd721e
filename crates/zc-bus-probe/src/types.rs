//! Core probe types, bus constants, and scan defaults.

use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Serialize;

use crate::error::{ProbeError, ProbeResult};

// ── CAN bus limits ──────────────────────────────────────────────

/// Highest standard (11-bit) CAN arbitration ID.
pub const CAN_ID_MAX: u16 = 0x7FF;

/// Largest data length code for classic CAN.
pub const MAX_DLC: u8 = 8;

// ── Scan defaults ───────────────────────────────────────────────

/// Default data length code requested by remote frames.
pub const DEFAULT_DLC: u8 = 8;

/// Default delay between CAN probes.
pub const DEFAULT_CAN_DELAY: Duration = Duration::from_millis(10);

/// Default progress cadence for numeric ranges.
pub const DEFAULT_PROGRESS_CADENCE: usize = 128;

/// Default line terminator appended to literal commands.
pub const DEFAULT_TERMINATOR: &str = "\r\n";

/// Fixed delay between literal commands.
pub const LITERAL_PROBE_DELAY: Duration = Duration::from_millis(600);

/// Time left for late replies after the last literal command.
pub const LITERAL_DRAIN_DELAY: Duration = Duration::from_secs(1);

/// Built-in serial command list, in send order.
pub const DEFAULT_COMMANDS: &[&str] = &[
    "HELP", "?", "COMMAND", "GET FLAG", "GETFLAG", "GETFLAG()", "FLAG", "flags", "ID", "INFO",
    "STATUS", "VERSION", "VER", "READ", "DUMP", "WHO", "WHOAMI", "HELLO", "PING", "RESET",
    "REBOOT", "ADMIN",
];

// ── Probe ───────────────────────────────────────────────────────

/// One transmissible unit produced while iterating a probe space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Remote transmission request for a standard CAN ID.
    RemoteFrame { id: u16, dlc: u8 },
    /// Text command for a serial device.
    Command { text: String, terminator: String },
}

impl Probe {
    /// Encode into the form handed to the transport.
    pub fn encode(&self) -> WireProbe {
        match self {
            Self::RemoteFrame { id, dlc } => WireProbe::RemoteFrame { id: *id, dlc: *dlc },
            Self::Command { text, terminator } => {
                let mut bytes = Vec::with_capacity(text.len() + terminator.len());
                bytes.extend_from_slice(text.as_bytes());
                bytes.extend_from_slice(terminator.as_bytes());
                WireProbe::Bytes(bytes)
            }
        }
    }
}

impl fmt::Display for Probe {
    /// CAN IDs as three uppercase hex digits, commands verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteFrame { id, .. } => write!(f, "{id:03X}"),
            Self::Command { text, .. } => f.write_str(text),
        }
    }
}

/// Transport-level form of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireProbe {
    /// RTR frame: no data bytes, only the requested length.
    RemoteFrame { id: u16, dlc: u8 },
    /// Raw bytes written as-is.
    Bytes(Vec<u8>),
}

impl fmt::Display for WireProbe {
    /// `cansend` notation for frames, escaped text for bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteFrame { id, dlc } => write!(f, "{id:03X}#R{dlc}"),
            Self::Bytes(bytes) => write!(f, "{}", bytes.escape_ascii()),
        }
    }
}

// ── Rate & cadence ──────────────────────────────────────────────

/// Delay applied after every successfully sent probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControl {
    delay: Duration,
}

impl RateControl {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Build from a user-supplied number of seconds.
    pub fn from_secs_f64(secs: f64) -> ProbeResult<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ProbeError::Config(format!(
                "delay must be a non-negative number of seconds, got {secs}"
            )));
        }
        Ok(Self::new(duration_from_secs(secs)))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// How often successful sends are surfaced to the progress reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCadence(NonZeroUsize);

impl ReportCadence {
    /// Report every probe.
    pub const EVERY_PROBE: Self = Self(NonZeroUsize::MIN);

    pub fn every(n: usize) -> ProbeResult<Self> {
        NonZeroUsize::new(n)
            .map(Self)
            .ok_or_else(|| ProbeError::Config("progress cadence must be at least 1".into()))
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }

    /// Whether the probe at `index` (zero-based) should be reported.
    pub fn should_report(&self, index: usize) -> bool {
        index % self.0.get() == 0
    }
}

/// Seconds to a duration rounded to the microsecond, so `0.6` is exactly
/// 600 ms. Callers validate that `secs` is finite and non-negative.
pub fn duration_from_secs(secs: f64) -> Duration {
    Duration::from_micros((secs * 1e6).round() as u64)
}

// ── Session result ──────────────────────────────────────────────

/// Counters and outcome of one sequencer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionResult {
    /// Probes the transport accepted.
    pub sent: usize,
    /// Probes the transport rejected (0 or 1 under fail-fast).
    pub failed: usize,
    /// Last probe the transport accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sent: Option<Probe>,
    /// Probe that aborted the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_probe: Option<Probe>,
    /// Transport error message for the aborting probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionResult {
    pub fn is_failed(&self) -> bool {
        self.failed_probe.is_some()
    }
}
