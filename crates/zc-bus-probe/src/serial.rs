//! Serial-port transport.
//!
//! The port is split once: the write half stays behind an async mutex for
//! `send`, the read half is handed to the recorder by `open_capture`. Both
//! halves share the same device, and `tokio::io::split` serializes access.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{ProbeError, ProbeResult};
use crate::transport::{CaptureSource, ProbeTransport};
use crate::types::WireProbe;

/// Line speed used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Size of one capture read.
const READ_BUFFER_SIZE: usize = 1024;

/// Writes command bytes to a serial device (8N1, no flow control).
pub struct SerialTransport {
    path: String,
    writer: tokio::sync::Mutex<WriteHalf<SerialStream>>,
    reader: Mutex<Option<ReadHalf<SerialStream>>>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> ProbeResult<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| ProbeError::Interface(format!("{path}: {e}")))?;
        let (reader, writer) = tokio::io::split(port);
        tracing::debug!(path, baud_rate, "serial port opened");
        Ok(Self {
            path: path.to_string(),
            writer: tokio::sync::Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
        })
    }
}

#[async_trait]
impl ProbeTransport for SerialTransport {
    fn name(&self) -> &str {
        &self.path
    }

    async fn send(&self, probe: &WireProbe) -> ProbeResult<()> {
        let bytes = match probe {
            WireProbe::Bytes(bytes) => bytes,
            WireProbe::RemoteFrame { .. } => {
                return Err(ProbeError::Send {
                    probe: probe.to_string(),
                    reason: "serial transport only sends bytes".into(),
                });
            }
        };
        let mut writer = self.writer.lock().await;
        let result = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| ProbeError::Send {
            probe: probe.to_string(),
            reason: e.to_string(),
        })
    }

    fn open_capture(&self) -> ProbeResult<Option<Box<dyn CaptureSource>>> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(reader.map(|reader| Box::new(SerialCapture { reader }) as Box<dyn CaptureSource>))
    }
}

/// Read half of the serial port.
pub struct SerialCapture {
    reader: ReadHalf<SerialStream>,
}

#[async_trait]
impl CaptureSource for SerialCapture {
    async fn read_chunk(&mut self) -> ProbeResult<Option<Vec<u8>>> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let n = self
            .reader
            .read(&mut buf)
            .await
            .map_err(|e| ProbeError::Read(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}
