//! Human-readable progress output.
//!
//! Status lines go to stdout with severity prefixes: `[*]` progress,
//! `[+]` success, `[!]` problems. Diagnostics go through `tracing` instead.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::error::ProbeError;
use crate::recorder::RecorderReport;
use crate::space::ProbeSpace;
use crate::types::{Probe, SessionResult};

/// Hint printed after a transport failure.
pub const TRANSPORT_HINT: &str =
    "check that the interface/device exists and is up, and that you have permission to use it";

/// Hint printed after a configuration error.
pub const CONFIG_HINT: &str = "fix the arguments and retry (see --help)";

/// Receives sequencer and orchestrator events.
///
/// Callbacks run inline on the send loop and must not block.
pub trait ProgressReporter: Send + Sync {
    /// A scan is about to start.
    fn on_start(&self, _space: &ProbeSpace, _transport: &str) {}

    /// A probe was sent. Called at the sequencer's cadence, not per probe.
    fn on_progress(&self, probe: &Probe, index: usize);

    /// Every probe was sent.
    fn on_complete(&self, result: &SessionResult, space: &ProbeSpace);

    /// The scan aborted on a send failure.
    fn on_failure(&self, result: &SessionResult);

    /// The scan never started: bad configuration or unavailable transport.
    fn on_rejected(&self, _error: &ProbeError) {}

    /// The passive recorder was stopped.
    fn on_capture_stopped(&self, _report: &RecorderReport) {}
}

/// Writes status lines to stdout (or any writer, for tests).
pub struct ConsoleReporter<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleReporter {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Print a `[!] Hint:` line.
    pub fn hint(&self, hint: &str) {
        self.line(format_args!("[!] Hint: {hint}"));
    }

    /// Print one unprefixed line, e.g. the `--json` outcome.
    pub fn print(&self, text: impl std::fmt::Display) {
        self.line(format_args!("{text}"));
    }

    fn line(&self, text: std::fmt::Arguments<'_>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // Status output is best effort; a closed stdout must not stop a scan.
        let _ = writeln!(out, "{text}");
    }
}

impl<W: Write + Send> ProgressReporter for ConsoleReporter<W> {
    fn on_start(&self, space: &ProbeSpace, transport: &str) {
        self.line(format_args!("[*] Probing {} on {transport}", space.describe()));
    }

    fn on_progress(&self, probe: &Probe, index: usize) {
        match probe {
            Probe::RemoteFrame { .. } => self.line(format_args!("[*] #{index:<5} sent ID {probe}")),
            Probe::Command { text, .. } => self.line(format_args!("[+] #{index:<5} sent {text:?}")),
        }
    }

    fn on_complete(&self, result: &SessionResult, space: &ProbeSpace) {
        self.line(format_args!(
            "[+] Done: sent={} failed={} over {}",
            result.sent,
            result.failed,
            space.describe()
        ));
        if let Some(last) = &result.last_sent {
            self.line(format_args!("[+] Last probe sent: {last}"));
        }
    }

    fn on_failure(&self, result: &SessionResult) {
        let probe = result
            .failed_probe
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "?".to_string());
        let reason = result.error.as_deref().unwrap_or("unknown error");
        self.line(format_args!("[!] Send failed at probe {probe}: {reason}"));
        match &result.last_sent {
            Some(last) => self.line(format_args!(
                "[!] {} probe(s) sent before the failure, last was {last}",
                result.sent
            )),
            None => self.line(format_args!("[!] No probes were sent")),
        }
        self.hint(TRANSPORT_HINT);
    }

    fn on_rejected(&self, error: &ProbeError) {
        self.line(format_args!("[!] {error}"));
        let hint = match error {
            ProbeError::Config(_) => CONFIG_HINT,
            _ => TRANSPORT_HINT,
        };
        self.hint(hint);
    }

    fn on_capture_stopped(&self, report: &RecorderReport) {
        self.line(format_args!(
            "[*] Capture: {} byte(s) read, {} kept in {}",
            report.bytes_read, report.bytes_kept, report.sink
        ));
        if let Some(error) = &report.error {
            self.line(format_args!("[!] Capture ended early: {error}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{CanIdRange, CommandList};

    fn output(reporter: ConsoleReporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn progress_lines() {
        let reporter = ConsoleReporter::new(Vec::new());
        reporter.on_progress(&Probe::RemoteFrame { id: 0x80, dlc: 8 }, 128);
        reporter.on_progress(
            &Probe::Command {
                text: "GET FLAG".into(),
                terminator: "\r\n".into(),
            },
            3,
        );
        let out = output(reporter);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "[*] #128   sent ID 080");
        assert_eq!(lines[1], "[+] #3     sent \"GET FLAG\"");
    }

    #[test]
    fn completion_summary() {
        let reporter = ConsoleReporter::new(Vec::new());
        let space = ProbeSpace::CanRange(CanIdRange::new(0, 2, 8).unwrap());
        let result = SessionResult {
            sent: 3,
            last_sent: Some(Probe::RemoteFrame { id: 2, dlc: 8 }),
            ..Default::default()
        };
        reporter.on_complete(&result, &space);
        let out = output(reporter);
        assert!(out.contains("[+] Done: sent=3 failed=0 over 0x000-0x002 (3 IDs, DLC 8)"));
        assert!(out.contains("[+] Last probe sent: 002"));
    }

    #[test]
    fn failure_prints_probe_and_hint() {
        let reporter = ConsoleReporter::new(Vec::new());
        let result = SessionResult {
            sent: 4,
            failed: 1,
            last_sent: Some(Probe::RemoteFrame { id: 3, dlc: 8 }),
            failed_probe: Some(Probe::RemoteFrame { id: 4, dlc: 8 }),
            error: Some("Network is down".into()),
        };
        reporter.on_failure(&result);
        let out = output(reporter);
        assert!(out.contains("[!] Send failed at probe 004: Network is down"));
        assert!(out.contains("4 probe(s) sent before the failure, last was 003"));
        assert!(out.contains(TRANSPORT_HINT));
    }

    #[test]
    fn rejection_hint_depends_on_error() {
        let reporter = ConsoleReporter::new(Vec::new());
        reporter.on_rejected(&ProbeError::Config("start 0x010 is greater than end 0x005".into()));
        reporter.on_rejected(&ProbeError::Interface("can9: No such device".into()));
        let out = output(reporter);
        assert!(out.contains("[!] invalid configuration: start 0x010"));
        assert!(out.contains(CONFIG_HINT));
        assert!(out.contains("[!] transport unavailable: can9"));
        assert!(out.contains(TRANSPORT_HINT));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn closed_output_is_ignored() {
        let reporter = ConsoleReporter::new(ClosedPipe);
        reporter.hint(CONFIG_HINT);
        reporter.print("{\"outcome\":\"completed\"}");
        reporter.on_rejected(&ProbeError::Config("bad".into()));
    }

    #[test]
    fn hint_and_plain_lines() {
        let reporter = ConsoleReporter::new(Vec::new());
        reporter.hint(CONFIG_HINT);
        reporter.print("{\"outcome\":\"completed\"}");
        let out = output(reporter);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("[!] Hint: {CONFIG_HINT}"));
        assert_eq!(lines[1], "{\"outcome\":\"completed\"}");
    }

    #[test]
    fn start_and_capture_lines() {
        let reporter = ConsoleReporter::new(Vec::new());
        reporter.on_start(&ProbeSpace::Commands(CommandList::defaults()), "/dev/ttyUSB0");
        reporter.on_capture_stopped(&RecorderReport {
            sink: "serial.log".into(),
            bytes_read: 10,
            bytes_kept: 8,
            error: Some("device unplugged".into()),
            timed_out: false,
        });
        let out = output(reporter);
        assert!(out.contains("[*] Probing 22 commands (HELP .. ADMIN) on /dev/ttyUSB0"));
        assert!(out.contains("[*] Capture: 10 byte(s) read, 8 kept in serial.log"));
        assert!(out.contains("[!] Capture ended early: device unplugged"));
    }
}
