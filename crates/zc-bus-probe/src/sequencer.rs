//! Probe sequencer: sends every probe of a space, in order, one at a time.
//!
//! Fail-fast: the first send error aborts the run. A failed send means the
//! interface is unusable, not that one ID or command is bad, so continuing
//! would only produce a wall of identical errors.

use crate::clock::Delay;
use crate::error::ProbeError;
use crate::reporter::ProgressReporter;
use crate::space::ProbeSpace;
use crate::transport::ProbeTransport;
use crate::types::{RateControl, ReportCadence, SessionResult};

/// Drives one scan over a transport.
pub struct ProbeSequencer<'a> {
    transport: &'a dyn ProbeTransport,
    delay: &'a dyn Delay,
    reporter: &'a dyn ProgressReporter,
    rate: RateControl,
    cadence: Option<ReportCadence>,
}

impl<'a> ProbeSequencer<'a> {
    pub fn new(
        transport: &'a dyn ProbeTransport,
        delay: &'a dyn Delay,
        reporter: &'a dyn ProgressReporter,
        rate: RateControl,
    ) -> Self {
        Self {
            transport,
            delay,
            reporter,
            rate,
            cadence: None,
        }
    }

    /// Override the space's default progress cadence.
    pub fn with_cadence(mut self, cadence: ReportCadence) -> Self {
        self.cadence = Some(cadence);
        self
    }

    /// Send every probe in `space`, waiting `rate` after each success.
    ///
    /// Returns early, flagged as failed, on the first send error.
    pub async fn run(&self, space: &ProbeSpace) -> SessionResult {
        let cadence = self.cadence.unwrap_or_else(|| space.default_cadence());
        let mut result = SessionResult::default();

        for (index, probe) in space.iter().enumerate() {
            let wire = probe.encode();

            if let Err(e) = self.transport.send(&wire).await {
                tracing::warn!(
                    probe = %probe,
                    index,
                    sent = result.sent,
                    error = %e,
                    "send failed, aborting scan"
                );
                result.failed += 1;
                result.error = Some(match e {
                    ProbeError::Send { reason, .. } => reason,
                    other => other.to_string(),
                });
                result.failed_probe = Some(probe);
                return result;
            }

            result.sent += 1;
            if cadence.should_report(index) {
                self.reporter.on_progress(&probe, index);
            }
            tracing::trace!(wire = %wire, index, "probe sent");
            result.last_sent = Some(probe);

            self.delay.sleep(self.rate.delay()).await;
        }

        result
    }
}
