//! Prober error types.

use thiserror::Error;

/// Errors that can occur while configuring or running a probe scan.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("send failed for probe {probe}: {reason}")]
    Send { probe: String, reason: String },

    #[error("capture read failed: {0}")]
    Read(String),

    #[error("transport unavailable: {0}")]
    Interface(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Convenience alias for prober results.
pub type ProbeResult<T> = Result<T, ProbeError>;
