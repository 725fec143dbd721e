//! Transport seam between the prober and a physical bus.
//!
//! `ProbeTransport` is the send direction, `CaptureSource` the optional
//! receive direction. Real implementations live in `interface` (SocketCAN,
//! Linux-only) and `serial`; `mock` provides scripted ones for tests.
//!
//! When both directions share one device, the transport serializes access
//! internally. The prober never locks the device itself.

use async_trait::async_trait;

use crate::error::ProbeResult;
use crate::types::WireProbe;

/// Send side of a bus connection.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Short human-readable name (interface or device path).
    fn name(&self) -> &str;

    /// Transmit one encoded probe.
    ///
    /// An error means the transport itself is unusable; the sequencer
    /// aborts the scan on the first one.
    async fn send(&self, probe: &WireProbe) -> ProbeResult<()>;

    /// Open the receive direction for capture-while-sending.
    ///
    /// Returns `Ok(None)` when the transport cannot capture, or when the
    /// receive side was already handed out.
    fn open_capture(&self) -> ProbeResult<Option<Box<dyn CaptureSource>>>;
}

/// Receive side of a bus connection, read by the passive recorder.
#[async_trait]
pub trait CaptureSource: Send {
    /// Wait for the next chunk of raw bytes.
    ///
    /// `Ok(None)` signals end of stream. Must be cancel-safe: the recorder
    /// drops a pending read when it is stopped.
    async fn read_chunk(&mut self) -> ProbeResult<Option<Vec<u8>>>;
}
