//! Finite, ordered probe spaces: CAN ID ranges and literal command lists.
//!
//! A space is validated once at construction and is immutable afterwards.
//! Iteration yields fresh `Probe` values in send order.

use std::ops::RangeInclusive;

use crate::error::{ProbeError, ProbeResult};
use crate::types::{
    CAN_ID_MAX, DEFAULT_COMMANDS, DEFAULT_PROGRESS_CADENCE, DEFAULT_TERMINATOR, MAX_DLC, Probe,
    ReportCadence,
};

/// Inclusive range of standard CAN IDs probed with remote frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanIdRange {
    start: u16,
    end: u16,
    dlc: u8,
}

impl CanIdRange {
    /// Validate bounds against the 11-bit ID space.
    ///
    /// Bounds are taken as `i64` so negative user input is reported as a
    /// configuration error rather than wrapping.
    pub fn new(start: i64, end: i64, dlc: u8) -> ProbeResult<Self> {
        let max = i64::from(CAN_ID_MAX);
        for (name, bound) in [("start", start), ("end", end)] {
            if bound < 0 {
                return Err(ProbeError::Config(format!(
                    "{name} bound {bound} is negative"
                )));
            }
            if bound > max {
                return Err(ProbeError::Config(format!(
                    "{name} bound 0x{bound:X} exceeds 0x{max:03X}"
                )));
            }
        }
        if start > end {
            return Err(ProbeError::Config(format!(
                "start 0x{start:03X} is greater than end 0x{end:03X}"
            )));
        }
        if dlc > MAX_DLC {
            return Err(ProbeError::Config(format!(
                "data length code {dlc} exceeds {MAX_DLC}"
            )));
        }
        Ok(Self {
            start: start as u16,
            end: end as u16,
            dlc,
        })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    pub fn ids(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

/// Ordered list of text commands sent with a line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandList {
    commands: Vec<String>,
    terminator: String,
}

impl CommandList {
    pub fn new(commands: Vec<String>, terminator: impl Into<String>) -> ProbeResult<Self> {
        if commands.is_empty() {
            return Err(ProbeError::Config("command list is empty".into()));
        }
        Ok(Self {
            commands,
            terminator: terminator.into(),
        })
    }

    /// The built-in command list terminated with CRLF.
    pub fn defaults() -> Self {
        Self {
            commands: DEFAULT_COMMANDS.iter().map(|c| (*c).to_string()).collect(),
            terminator: DEFAULT_TERMINATOR.to_string(),
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }
}

/// The set of probes a scan transmits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSpace {
    CanRange(CanIdRange),
    Commands(CommandList),
}

impl ProbeSpace {
    /// Number of probes the space yields.
    pub fn len(&self) -> usize {
        match self {
            Self::CanRange(r) => usize::from(r.end - r.start) + 1,
            Self::Commands(c) => c.commands.len(),
        }
    }

    /// Always false: construction rejects empty spaces.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> ProbeIter<'_> {
        match self {
            Self::CanRange(r) => ProbeIter::Range {
                ids: r.ids(),
                dlc: r.dlc,
            },
            Self::Commands(c) => ProbeIter::Commands {
                commands: c.commands.iter(),
                terminator: &c.terminator,
            },
        }
    }

    /// Ranges are large, so only every Nth ID is reported. Each command
    /// is meaningful on its own and is always reported.
    pub fn default_cadence(&self) -> ReportCadence {
        match self {
            Self::CanRange(_) => ReportCadence::every(DEFAULT_PROGRESS_CADENCE)
                .unwrap_or(ReportCadence::EVERY_PROBE),
            Self::Commands(_) => ReportCadence::EVERY_PROBE,
        }
    }

    /// One-line summary of the space, e.g. `0x000-0x7FF (2048 IDs)`.
    pub fn describe(&self) -> String {
        match self {
            Self::CanRange(r) => format!(
                "0x{:03X}-0x{:03X} ({} IDs, DLC {})",
                r.start,
                r.end,
                self.len(),
                r.dlc
            ),
            Self::Commands(c) => format!(
                "{} commands ({} .. {})",
                c.commands.len(),
                c.commands.first().map(String::as_str).unwrap_or_default(),
                c.commands.last().map(String::as_str).unwrap_or_default()
            ),
        }
    }
}

/// Iterator over the probes of a [`ProbeSpace`].
pub enum ProbeIter<'a> {
    Range {
        ids: RangeInclusive<u16>,
        dlc: u8,
    },
    Commands {
        commands: std::slice::Iter<'a, String>,
        terminator: &'a str,
    },
}

impl Iterator for ProbeIter<'_> {
    type Item = Probe;

    fn next(&mut self) -> Option<Probe> {
        match self {
            Self::Range { ids, dlc } => ids.next().map(|id| Probe::RemoteFrame { id, dlc: *dlc }),
            Self::Commands {
                commands,
                terminator,
            } => commands.next().map(|text| Probe::Command {
                text: text.clone(),
                terminator: (*terminator).to_string(),
            }),
        }
    }
}
