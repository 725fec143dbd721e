//! Scan orchestration: validate, connect, capture, sequence, report.
//!
//! The orchestrator validates the request before it connects to anything, so
//! a bad configuration has no side effects: no socket, no device, no log
//! file. Outcomes map onto process exit codes.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Delay;
use crate::error::{ProbeError, ProbeResult};
use crate::recorder::{
    CaptureSink, DEFAULT_STOP_GRACE, PassiveRecorder, RecorderHandle, RecorderReport,
};
use crate::reporter::ProgressReporter;
use crate::sequencer::ProbeSequencer;
use crate::space::{CanIdRange, CommandList, ProbeSpace};
use crate::transport::ProbeTransport;
use crate::types::{
    DEFAULT_CAN_DELAY, DEFAULT_DLC, LITERAL_DRAIN_DELAY, LITERAL_PROBE_DELAY, RateControl,
    ReportCadence, SessionResult, duration_from_secs,
};

// ── Request ─────────────────────────────────────────────────────

/// What to probe, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbePlan {
    /// Remote frames over `[start, end]`.
    CanRange { start: i64, end: i64, dlc: u8 },
    /// Text commands, each followed by `terminator`.
    Commands {
        commands: Vec<String>,
        terminator: String,
    },
}

/// Unvalidated scan parameters, as collected from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub plan: ProbePlan,
    /// Delay after every probe, in seconds.
    pub delay_secs: f64,
    /// Progress cadence; `None` uses the space default.
    pub cadence: Option<usize>,
    /// Wait after the last probe so late replies are captured, in seconds.
    pub drain_secs: f64,
    /// How long to wait for the recorder to stop, in seconds.
    pub stop_grace_secs: f64,
}

impl ScanRequest {
    /// CAN range scan with the default 10 ms pacing and no drain.
    pub fn can_range(start: i64, end: i64, dlc: u8) -> Self {
        Self {
            plan: ProbePlan::CanRange { start, end, dlc },
            delay_secs: DEFAULT_CAN_DELAY.as_secs_f64(),
            cadence: None,
            drain_secs: 0.0,
            stop_grace_secs: DEFAULT_STOP_GRACE.as_secs_f64(),
        }
    }

    /// Full 11-bit range with DLC 8.
    pub fn full_can_range() -> Self {
        Self::can_range(0, i64::from(crate::types::CAN_ID_MAX), DEFAULT_DLC)
    }

    /// Command scan with the fixed 0.6 s pacing and 1 s drain.
    pub fn commands(commands: Vec<String>, terminator: impl Into<String>) -> Self {
        Self {
            plan: ProbePlan::Commands {
                commands,
                terminator: terminator.into(),
            },
            delay_secs: LITERAL_PROBE_DELAY.as_secs_f64(),
            cadence: None,
            drain_secs: LITERAL_DRAIN_DELAY.as_secs_f64(),
            stop_grace_secs: DEFAULT_STOP_GRACE.as_secs_f64(),
        }
    }

    /// The built-in command list.
    pub fn default_commands() -> Self {
        let list = CommandList::defaults();
        Self::commands(list.commands().to_vec(), list.terminator())
    }

    pub fn with_delay_secs(mut self, secs: f64) -> Self {
        self.delay_secs = secs;
        self
    }

    pub fn with_cadence(mut self, cadence: usize) -> Self {
        self.cadence = Some(cadence);
        self
    }

    pub fn with_drain_secs(mut self, secs: f64) -> Self {
        self.drain_secs = secs;
        self
    }

    pub fn with_stop_grace_secs(mut self, secs: f64) -> Self {
        self.stop_grace_secs = secs;
        self
    }

    /// Check every parameter and build the immutable probe space.
    pub fn validate(&self) -> ProbeResult<ValidatedScan> {
        let space = match &self.plan {
            ProbePlan::CanRange { start, end, dlc } => {
                ProbeSpace::CanRange(CanIdRange::new(*start, *end, *dlc)?)
            }
            ProbePlan::Commands {
                commands,
                terminator,
            } => ProbeSpace::Commands(CommandList::new(commands.clone(), terminator.clone())?),
        };
        let rate = RateControl::from_secs_f64(self.delay_secs)?;
        let cadence = match self.cadence {
            Some(n) => ReportCadence::every(n)?,
            None => space.default_cadence(),
        };
        Ok(ValidatedScan {
            space,
            rate,
            cadence,
            drain: seconds("drain", self.drain_secs)?,
            stop_grace: seconds("recorder stop grace", self.stop_grace_secs)?,
        })
    }
}

fn seconds(what: &str, secs: f64) -> ProbeResult<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ProbeError::Config(format!(
            "{what} must be a non-negative number of seconds, got {secs}"
        )));
    }
    Ok(duration_from_secs(secs))
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedScan {
    pub space: ProbeSpace,
    pub rate: RateControl,
    pub cadence: ReportCadence,
    pub drain: Duration,
    pub stop_grace: Duration,
}

/// An open transport plus an optional capture destination.
pub struct Connection {
    pub transport: Arc<dyn ProbeTransport>,
    pub sink: Option<CaptureSink>,
}

// ── Outcome ─────────────────────────────────────────────────────

/// Process exit code for a fully sent scan.
pub const EXIT_OK: u8 = 0;
/// Process exit code for invalid configuration.
pub const EXIT_CONFIG: u8 = 1;
/// Process exit code for a transport failure.
pub const EXIT_TRANSPORT: u8 = 2;

/// Final state of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Every probe was sent.
    Completed {
        result: SessionResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        capture: Option<RecorderReport>,
    },
    /// Rejected before any transmission.
    InvalidConfig { error: String },
    /// The transport could not be opened.
    TransportUnavailable { error: String },
    /// A send failed mid-scan.
    SendFailed {
        result: SessionResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        capture: Option<RecorderReport>,
    },
}

impl ScanOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed { .. } => EXIT_OK,
            Self::InvalidConfig { .. } => EXIT_CONFIG,
            Self::TransportUnavailable { .. } | Self::SendFailed { .. } => EXIT_TRANSPORT,
        }
    }

    pub fn result(&self) -> Option<&SessionResult> {
        match self {
            Self::Completed { result, .. } | Self::SendFailed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn capture(&self) -> Option<&RecorderReport> {
        match self {
            Self::Completed { capture, .. } | Self::SendFailed { capture, .. } => capture.as_ref(),
            _ => None,
        }
    }
}

// ── Orchestrator ────────────────────────────────────────────────

/// Wires the sequencer, recorder and reporter together for one scan.
pub struct Orchestrator<'a> {
    delay: &'a dyn Delay,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(delay: &'a dyn Delay, reporter: &'a dyn ProgressReporter) -> Self {
        Self { delay, reporter }
    }

    /// Run one scan.
    ///
    /// `connect` is only called once the request is valid. Capture runs
    /// when `connect` supplies a sink and the transport can capture.
    pub async fn run<F>(&self, request: &ScanRequest, connect: F) -> ScanOutcome
    where
        F: FnOnce(&ValidatedScan) -> ProbeResult<Connection>,
    {
        let scan = match request.validate() {
            Ok(scan) => scan,
            Err(e) => {
                tracing::debug!(error = %e, "scan request rejected");
                self.reporter.on_rejected(&e);
                return ScanOutcome::InvalidConfig {
                    error: e.to_string(),
                };
            }
        };

        let Connection { transport, sink } = match connect(&scan) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(error = %e, "failed to open transport");
                self.reporter.on_rejected(&e);
                return ScanOutcome::TransportUnavailable {
                    error: e.to_string(),
                };
            }
        };

        tracing::info!(
            transport = transport.name(),
            probes = scan.space.len(),
            delay_ms = scan.rate.delay().as_millis() as u64,
            "scan starting"
        );
        self.reporter.on_start(&scan.space, transport.name());

        let mut recorder = sink.and_then(|sink| start_capture(transport.as_ref(), sink));

        let result = ProbeSequencer::new(transport.as_ref(), self.delay, self.reporter, scan.rate)
            .with_cadence(scan.cadence)
            .run(&scan.space)
            .await;

        if !result.is_failed() && !scan.drain.is_zero() {
            self.delay.sleep(scan.drain).await;
        }

        let capture = match recorder.as_mut() {
            Some(handle) => {
                let report = handle.stop(scan.stop_grace).await;
                self.reporter.on_capture_stopped(&report);
                Some(report)
            }
            None => None,
        };

        tracing::info!(
            sent = result.sent,
            failed = result.failed,
            "scan finished"
        );

        if result.is_failed() {
            self.reporter.on_failure(&result);
            ScanOutcome::SendFailed { result, capture }
        } else {
            self.reporter.on_complete(&result, &scan.space);
            ScanOutcome::Completed { result, capture }
        }
    }
}

/// Start the recorder if the transport can capture. Capture problems are
/// logged and never stop the scan.
fn start_capture(
    transport: &dyn ProbeTransport,
    sink: CaptureSink,
) -> Option<RecorderHandle> {
    match transport.open_capture() {
        Ok(Some(source)) => Some(PassiveRecorder::start(source, sink)),
        Ok(None) => {
            tracing::warn!(
                transport = transport.name(),
                "transport cannot capture, continuing without capture"
            );
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to open capture, continuing without capture");
            None
        }
    }
}

/// Map a setup failure inside a `connect` closure to a transport error.
pub fn transport_error(e: impl std::fmt::Display) -> ProbeError {
    ProbeError::Interface(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, RecordingDelay, RecordingReporter, SharedBuffer};
    use crate::types::{Probe, WireProbe};

    fn connect_mock(
        mock: &Arc<MockTransport>,
        sink: Option<CaptureSink>,
    ) -> impl FnOnce(&ValidatedScan) -> ProbeResult<Connection> {
        let transport: Arc<dyn ProbeTransport> = mock.clone();
        move |_| Ok(Connection { transport, sink })
    }

    #[test]
    fn validate_builds_space_and_defaults() {
        let scan = ScanRequest::full_can_range().validate().unwrap();
        assert_eq!(scan.space.len(), 2048);
        assert_eq!(scan.rate.delay(), Duration::from_millis(10));
        assert_eq!(scan.cadence.get(), 128);
        assert!(scan.drain.is_zero());

        let scan = ScanRequest::default_commands().validate().unwrap();
        assert_eq!(scan.space.len(), 22);
        assert_eq!(scan.rate.delay(), Duration::from_millis(600));
        assert_eq!(scan.cadence.get(), 1);
        assert_eq!(scan.drain, Duration::from_secs(1));
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(ScanRequest::can_range(0x10, 0x05, 8).validate().is_err());
        assert!(ScanRequest::can_range(0, 0x7FF, 8).with_delay_secs(-1.0).validate().is_err());
        assert!(ScanRequest::can_range(0, 0x7FF, 8).with_cadence(0).validate().is_err());
        assert!(ScanRequest::commands(Vec::new(), "\r\n").validate().is_err());
    }

    #[tokio::test]
    async fn bad_drain_or_grace_is_rejected_before_sending() {
        for request in [
            ScanRequest::default_commands().with_drain_secs(-1.0),
            ScanRequest::default_commands().with_stop_grace_secs(-5.0),
            ScanRequest::can_range(0, 2, 8).with_stop_grace_secs(f64::NAN),
        ] {
            let mock = Arc::new(MockTransport::new());
            let reporter = RecordingReporter::new();
            let outcome = Orchestrator::new(&RecordingDelay::new(), &reporter)
                .run(&request, connect_mock(&mock, None))
                .await;
            assert!(matches!(outcome, ScanOutcome::InvalidConfig { .. }), "{outcome:?}");
            assert_eq!(outcome.exit_code(), 1);
            assert_eq!(mock.attempts(), 0);
            assert_eq!(reporter.rejections().len(), 1);
        }
    }

    #[test]
    fn exit_codes() {
        let done = ScanOutcome::Completed {
            result: SessionResult::default(),
            capture: None,
        };
        assert_eq!(done.exit_code(), 0);
        assert_eq!(
            ScanOutcome::InvalidConfig { error: String::new() }.exit_code(),
            1
        );
        assert_eq!(
            ScanOutcome::TransportUnavailable { error: String::new() }.exit_code(),
            2
        );
        let failed = ScanOutcome::SendFailed {
            result: SessionResult::default(),
            capture: None,
        };
        assert_eq!(failed.exit_code(), 2);
    }

    #[tokio::test]
    async fn completes_small_range() {
        let mock = Arc::new(MockTransport::new());
        let delay = RecordingDelay::new();
        let reporter = RecordingReporter::new();

        let outcome = Orchestrator::new(&delay, &reporter)
            .run(&ScanRequest::can_range(0, 2, 8), connect_mock(&mock, None))
            .await;

        assert_eq!(outcome.exit_code(), 0);
        let result = outcome.result().unwrap();
        assert_eq!((result.sent, result.failed), (3, 0));
        assert_eq!(reporter.completed().len(), 1);
        assert!(reporter.failures().is_empty());
        assert!(outcome.capture().is_none());
    }

    #[tokio::test]
    async fn inverted_range_never_connects() {
        let reporter = RecordingReporter::new();
        let mut connected = false;

        let outcome = Orchestrator::new(&RecordingDelay::new(), &reporter)
            .run(&ScanRequest::can_range(0x010, 0x005, 8), |_| {
                connected = true;
                Err(ProbeError::Interface("unreachable".into()))
            })
            .await;

        assert_eq!(outcome.exit_code(), 1);
        assert!(!connected);
        assert_eq!(reporter.rejections().len(), 1);
        assert!(reporter.rejections()[0].contains("greater than end"));
    }

    #[tokio::test]
    async fn unavailable_transport_exits_2() {
        let reporter = RecordingReporter::new();
        let outcome = Orchestrator::new(&RecordingDelay::new(), &reporter)
            .run(&ScanRequest::full_can_range(), |_| {
                Err(transport_error("can0: No such device (os error 19)"))
            })
            .await;

        assert_eq!(outcome.exit_code(), 2);
        assert!(matches!(outcome, ScanOutcome::TransportUnavailable { .. }));
        assert!(reporter.rejections()[0].contains("No such device"));
    }

    #[tokio::test]
    async fn send_failure_stops_recorder_and_exits_2() {
        let mock = Arc::new(MockTransport::failing_at(5));
        let buffer = SharedBuffer::new();
        let reporter = RecordingReporter::new();
        let delay = RecordingDelay::new();
        mock.push_capture(b"early\n".to_vec());

        let outcome = Orchestrator::new(&delay, &reporter)
            .run(
                &ScanRequest::can_range(0, 9, 8).with_drain_secs(1.0),
                connect_mock(&mock, Some(CaptureSink::new(buffer.clone(), "memory"))),
            )
            .await;

        assert_eq!(outcome.exit_code(), 2);
        let result = outcome.result().unwrap();
        assert_eq!(result.sent, 4);
        assert_eq!(result.failed_probe, Some(Probe::RemoteFrame { id: 4, dlc: 8 }));
        assert_eq!(mock.attempts(), 5);
        assert_eq!(reporter.failures().len(), 1);
        // Drain is skipped after a failure.
        assert!(!delay.sleeps().contains(&Duration::from_secs(1)));
        assert_eq!(buffer.shutdowns(), 1);
        assert_eq!(buffer.contents(), b"early\n");
        assert_eq!(reporter.captures().len(), 1);
    }

    #[tokio::test]
    async fn commands_capture_replies_during_run() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_reply(b"AB\x01CD".to_vec());
        let buffer = SharedBuffer::new();
        let delay = RecordingDelay::new();
        let reporter = RecordingReporter::new();

        let outcome = Orchestrator::new(&delay, &reporter)
            .run(
                &ScanRequest::default_commands(),
                connect_mock(&mock, Some(CaptureSink::new(buffer.clone(), "memory"))),
            )
            .await;

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(buffer.contents(), b"ABCD");
        let capture = outcome.capture().unwrap();
        assert_eq!((capture.bytes_read, capture.bytes_kept), (5, 4));

        let mut expected = vec![Duration::from_millis(600); 22];
        expected.push(Duration::from_secs(1));
        assert_eq!(delay.sleeps(), expected);
        assert_eq!(
            mock.sent().first(),
            Some(&WireProbe::Bytes(b"HELP\r\n".to_vec()))
        );
    }

    #[tokio::test]
    async fn scan_continues_when_capture_fails() {
        let mock = Arc::new(MockTransport::new());
        mock.fail_capture("device disconnected");
        let buffer = SharedBuffer::new();
        let reporter = RecordingReporter::new();

        let outcome = Orchestrator::new(&RecordingDelay::new(), &reporter)
            .run(
                &ScanRequest::can_range(0, 0xFF, 8),
                connect_mock(&mock, Some(CaptureSink::new(buffer.clone(), "memory"))),
            )
            .await;

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.result().unwrap().sent, 256);
        let capture = outcome.capture().unwrap();
        assert!(capture.error.as_deref().unwrap().contains("device disconnected"));
        assert_eq!(buffer.shutdowns(), 1);
    }

    #[tokio::test]
    async fn sink_without_capture_support_is_ignored() {
        let mock = Arc::new(MockTransport::without_capture());
        let buffer = SharedBuffer::new();
        let outcome = Orchestrator::new(&RecordingDelay::new(), &RecordingReporter::new())
            .run(
                &ScanRequest::can_range(0, 3, 8),
                connect_mock(&mock, Some(CaptureSink::new(buffer.clone(), "memory"))),
            )
            .await;

        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.capture().is_none());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = ScanOutcome::InvalidConfig {
            error: "bad".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "invalid_config");
        assert_eq!(json["error"], "bad");
    }
}
