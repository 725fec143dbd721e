//! Bounded sequential prober for CAN and serial buses.
//!
//! Walks a finite probe space (a range of 11-bit CAN IDs sent as remote
//! frames, or a list of text commands) one probe at a time with rate control,
//! while an optional passive recorder captures whatever the bus sends back.
//! Replies are stored raw for manual inspection, never interpreted.

pub mod clock;
pub mod error;
pub mod interface;
pub mod mock;
pub mod recorder;
pub mod reporter;
pub mod scan;
pub mod sequencer;
pub mod serial;
pub mod space;
pub mod transport;
pub mod types;

// Re-export key types for convenience
pub use clock::{Delay, TokioDelay};
pub use error::{ProbeError, ProbeResult};
pub use mock::{MockTransport, RecordingDelay, RecordingReporter, SharedBuffer};
pub use recorder::{CaptureSink, PassiveRecorder, RecorderHandle, RecorderReport};
pub use reporter::{ConsoleReporter, ProgressReporter};
pub use scan::{Connection, Orchestrator, ProbePlan, ScanOutcome, ScanRequest, ValidatedScan};
pub use sequencer::ProbeSequencer;
pub use serial::SerialTransport;
pub use space::{CanIdRange, CommandList, ProbeSpace};
pub use transport::{CaptureSource, ProbeTransport};
pub use types::{Probe, RateControl, ReportCadence, SessionResult, WireProbe};

#[cfg(target_os = "linux")]
pub use interface::SocketCanTransport;
