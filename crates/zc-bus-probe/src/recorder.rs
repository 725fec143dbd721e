//! Passive recorder: "listen while you talk".
//!
//! Runs as a background tokio task next to the send loop, reading raw bytes
//! from a [`CaptureSource`] and appending the printable subset to a
//! [`CaptureSink`]. It shares no mutable state with the sequencer: a read
//! failure ends capture quietly and never reaches the scan.
//!
//! Stopping is cooperative via a `CancellationToken`, with a bounded grace
//! period after which the task is aborted and a warning logged.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ProbeResult;
use crate::transport::CaptureSource;

/// Default time `stop` waits for the read loop to acknowledge cancellation.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Printable ASCII plus tab, CR and LF.
pub fn is_capture_byte(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7E)
}

// ── Sink ────────────────────────────────────────────────────────

/// Append-only byte destination with a per-byte filter.
pub struct CaptureSink {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    filter: fn(u8) -> bool,
    label: String,
}

impl CaptureSink {
    /// Wrap any async writer, keeping only printable bytes.
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static, label: impl Into<String>) -> Self {
        Self {
            writer: Box::new(writer),
            filter: is_capture_byte,
            label: label.into(),
        }
    }

    /// Open `path` for appending, creating it if needed.
    pub fn append_to_file(path: &Path) -> ProbeResult<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(
            tokio::fs::File::from_std(file),
            path.display().to_string(),
        ))
    }

    /// Replace the byte filter.
    pub fn with_filter(mut self, filter: fn(u8) -> bool) -> Self {
        self.filter = filter;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Filter `chunk` and append the survivors. Returns how many were kept.
    async fn append(&mut self, chunk: &[u8]) -> std::io::Result<usize> {
        let kept: Vec<u8> = chunk.iter().copied().filter(|b| (self.filter)(*b)).collect();
        if !kept.is_empty() {
            self.writer.write_all(&kept).await?;
            self.writer.flush().await?;
        }
        Ok(kept.len())
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await
    }
}

// ── Report ──────────────────────────────────────────────────────

/// What the recorder saw between start and stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecorderReport {
    /// Sink label (usually the log file path).
    pub sink: String,
    /// Raw bytes read from the transport.
    pub bytes_read: u64,
    /// Bytes that passed the filter and were persisted.
    pub bytes_kept: u64,
    /// Read or write error that ended capture early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The loop missed the stop grace period and was aborted.
    pub timed_out: bool,
}

#[derive(Default)]
struct Counters {
    bytes_read: AtomicU64,
    bytes_kept: AtomicU64,
    ended: AtomicBool,
}

// ── Recorder ────────────────────────────────────────────────────

/// Entry point for background capture.
pub struct PassiveRecorder;

impl PassiveRecorder {
    /// Spawn the read loop and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(source: Box<dyn CaptureSource>, sink: CaptureSink) -> RecorderHandle {
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let label = sink.label().to_string();
        tracing::debug!(sink = %label, "recorder started");
        let task = tokio::spawn(read_loop(source, sink, cancel.clone(), counters.clone()));
        RecorderHandle {
            cancel,
            task: Some(task),
            counters,
            report: RecorderReport {
                sink: label,
                ..Default::default()
            },
        }
    }
}

/// Handle to a running recorder. Dropping it without `stop` cancels the
/// loop but does not wait for it.
pub struct RecorderHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Option<String>>>,
    counters: Arc<Counters>,
    report: RecorderReport,
}

impl RecorderHandle {
    /// True once the read loop has exited (stream end, read error, or stop).
    pub fn is_ended(&self) -> bool {
        self.counters.ended.load(Ordering::Acquire)
    }

    /// Cancel the read loop and wait up to `grace` for it to close the sink.
    ///
    /// Idempotent: later calls return the first call's report untouched.
    pub async fn stop(&mut self, grace: Duration) -> RecorderReport {
        let Some(mut task) = self.task.take() else {
            return self.report.clone();
        };
        self.cancel.cancel();

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(error)) => self.report.error = error,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "recorder task failed");
                self.report.error = Some(e.to_string());
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "recorder did not stop within grace period, aborting"
                );
                task.abort();
                self.report.timed_out = true;
            }
        }

        self.counters.ended.store(true, Ordering::Release);
        self.report.bytes_read = self.counters.bytes_read.load(Ordering::Acquire);
        self.report.bytes_kept = self.counters.bytes_kept.load(Ordering::Acquire);
        tracing::debug!(
            bytes_read = self.report.bytes_read,
            bytes_kept = self.report.bytes_kept,
            "recorder stopped"
        );
        self.report.clone()
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Read until cancelled, end of stream, or the first failure.
///
/// Reads are polled before the cancellation token, so bytes already
/// buffered by the transport are drained before the loop exits.
async fn read_loop(
    mut source: Box<dyn CaptureSource>,
    mut sink: CaptureSink,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) -> Option<String> {
    let mut failure = None;

    loop {
        let chunk = tokio::select! {
            biased;
            chunk = source.read_chunk() => chunk,
            () = cancel.cancelled() => break,
        };

        match chunk {
            Ok(Some(bytes)) => {
                counters
                    .bytes_read
                    .fetch_add(bytes.len() as u64, Ordering::AcqRel);
                match sink.append(&bytes).await {
                    Ok(kept) => {
                        counters.bytes_kept.fetch_add(kept as u64, Ordering::AcqRel);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, sink = %sink.label(), "capture write failed, capture stopped");
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("capture stream closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture read failed, capture stopped");
                failure = Some(e.to_string());
                break;
            }
        }
    }

    counters.ended.store(true, Ordering::Release);
    if let Err(e) = sink.close().await {
        tracing::warn!(error = %e, sink = %sink.label(), "failed to close capture sink");
    }
    failure
}
