//! Mock transport, capture source, clock, reporter and sink for testing.
//!
//! All tests use these instead of real CAN or serial hardware so the suite
//! runs in CI on any platform.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::clock::Delay;
use crate::error::{ProbeError, ProbeResult};
use crate::recorder::RecorderReport;
use crate::reporter::ProgressReporter;
use crate::space::ProbeSpace;
use crate::transport::{CaptureSource, ProbeTransport};
use crate::types::{Probe, SessionResult, WireProbe};

type CaptureItem = ProbeResult<Option<Vec<u8>>>;

// ── Transport ───────────────────────────────────────────────────

/// Mock transport with send recording, scripted failures and replies.
///
/// Replies queued with [`MockTransport::queue_reply`] are delivered on the
/// capture side one per successful send, like a device answering a probe.
pub struct MockTransport {
    name: String,
    /// All probes accepted by `send` (for test assertions).
    sent: Mutex<Vec<WireProbe>>,
    /// Number of `send` calls, including the failing one.
    attempts: AtomicUsize,
    /// 1-based send attempt that fails.
    fail_at: Option<usize>,
    /// Replies pushed to the capture side after each successful send.
    replies: Mutex<VecDeque<Vec<u8>>>,
    capture_tx: Mutex<Option<mpsc::UnboundedSender<CaptureItem>>>,
    capture_rx: Mutex<Option<mpsc::UnboundedReceiver<CaptureItem>>>,
}

impl MockTransport {
    /// Create a mock that accepts every probe and supports capture.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: "mock0".to_string(),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_at: None,
            replies: Mutex::new(VecDeque::new()),
            capture_tx: Mutex::new(Some(tx)),
            capture_rx: Mutex::new(Some(rx)),
        }
    }

    /// Create a mock whose `attempt`-th send (1-based) fails.
    pub fn failing_at(attempt: usize) -> Self {
        Self {
            fail_at: Some(attempt),
            ..Self::new()
        }
    }

    /// Create a mock that cannot capture.
    pub fn without_capture() -> Self {
        let mock = Self::new();
        mock.capture_rx.lock().unwrap().take();
        mock.capture_tx.lock().unwrap().take();
        mock
    }

    /// Queue a reply delivered after the next successful send.
    pub fn queue_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.replies.lock().unwrap().push_back(bytes.into());
    }

    /// Push bytes to the capture side immediately.
    pub fn push_capture(&self, bytes: impl Into<Vec<u8>>) {
        if let Some(tx) = self.capture_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(Some(bytes.into())));
        }
    }

    /// Make the next capture read fail.
    pub fn fail_capture(&self, reason: &str) {
        if let Some(tx) = self.capture_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Err(ProbeError::Read(reason.to_string())));
        }
    }

    /// Get copies of all probes that were accepted.
    pub fn sent(&self) -> Vec<WireProbe> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of send calls made, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, probe: &WireProbe) -> ProbeResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(attempt) {
            return Err(ProbeError::Send {
                probe: probe.to_string(),
                reason: "Network is down (os error 100)".into(),
            });
        }

        self.sent.lock().unwrap().push(probe.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        if let Some(reply) = reply {
            self.push_capture(reply);
        }
        Ok(())
    }

    fn open_capture(&self) -> ProbeResult<Option<Box<dyn CaptureSource>>> {
        Ok(self
            .capture_rx
            .lock()
            .unwrap()
            .take()
            .map(|rx| Box::new(MockCaptureSource { rx }) as Box<dyn CaptureSource>))
    }
}

// ── Capture source ──────────────────────────────────────────────

/// Capture source fed through a channel. Ends when every sender is dropped.
pub struct MockCaptureSource {
    rx: mpsc::UnboundedReceiver<CaptureItem>,
}

/// Test-side handle feeding a [`MockCaptureSource`].
#[derive(Clone)]
pub struct CaptureFeed {
    tx: mpsc::UnboundedSender<CaptureItem>,
}

impl CaptureFeed {
    /// Deliver a chunk (`Ok`) or a read failure (`Err`).
    pub fn send(&self, item: ProbeResult<Vec<u8>>) -> Result<(), String> {
        self.tx
            .send(item.map(Some))
            .map_err(|_| "capture source dropped".to_string())
    }
}

impl MockCaptureSource {
    pub fn channel() -> (Self, CaptureFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, CaptureFeed { tx })
    }
}

#[async_trait]
impl CaptureSource for MockCaptureSource {
    async fn read_chunk(&mut self) -> ProbeResult<Option<Vec<u8>>> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Ok(None),
        }
    }
}

// ── Clock ───────────────────────────────────────────────────────

/// Fake clock: records requested delays and yields instead of sleeping.
#[derive(Default)]
pub struct RecordingDelay {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// ── Reporter ────────────────────────────────────────────────────

/// Reporter that records every callback.
#[derive(Default)]
pub struct RecordingReporter {
    progress: Mutex<Vec<(String, usize)>>,
    completed: Mutex<Vec<SessionResult>>,
    failures: Mutex<Vec<SessionResult>>,
    rejections: Mutex<Vec<String>>,
    captures: Mutex<Vec<RecorderReport>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(probe label, index)` for every progress callback.
    pub fn progress(&self) -> Vec<(String, usize)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn progress_indices(&self) -> Vec<usize> {
        self.progress().into_iter().map(|(_, i)| i).collect()
    }

    pub fn completed(&self) -> Vec<SessionResult> {
        self.completed.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<SessionResult> {
        self.failures.lock().unwrap().clone()
    }

    pub fn rejections(&self) -> Vec<String> {
        self.rejections.lock().unwrap().clone()
    }

    pub fn captures(&self) -> Vec<RecorderReport> {
        self.captures.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_progress(&self, probe: &Probe, index: usize) {
        self.progress.lock().unwrap().push((probe.to_string(), index));
    }

    fn on_complete(&self, result: &SessionResult, _space: &ProbeSpace) {
        self.completed.lock().unwrap().push(result.clone());
    }

    fn on_failure(&self, result: &SessionResult) {
        self.failures.lock().unwrap().push(result.clone());
    }

    fn on_rejected(&self, error: &ProbeError) {
        self.rejections.lock().unwrap().push(error.to_string());
    }

    fn on_capture_stopped(&self, report: &RecorderReport) {
        self.captures.lock().unwrap().push(report.clone());
    }
}

// ── Sinks ───────────────────────────────────────────────────────

/// In-memory writer shared between the recorder and the test.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    shutdowns: Arc<AtomicUsize>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// How many times the writer was shut down (closed).
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Writer whose shutdown never completes, for grace-period tests.
pub struct StalledWriter;

impl AsyncWrite for StalledWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}
