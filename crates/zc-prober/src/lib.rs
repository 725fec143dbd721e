//! zc-prober: command-line front end for `zc-bus-probe`.
//!
//! Re-exports all modules so integration tests can build requests and run
//! scans against mock transports.

pub mod cli;
pub mod config;
pub mod run;
pub mod telemetry;
