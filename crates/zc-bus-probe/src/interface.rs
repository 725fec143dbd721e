//! SocketCAN transport.
//!
//! Probes go out as standard-ID remote frames on one socket. Capture opens a
//! second raw socket on the same interface and renders every received frame
//! as a candump-style text line (`123#DEADBEEF`, `123#R`), so the recorder
//! can treat CAN and serial traffic the same way.

/// Render one frame in `cansend`/candump compact notation, newline-terminated.
pub fn candump_line(id: u32, extended: bool, remote: bool, data: &[u8]) -> String {
    let id = if extended {
        format!("{id:08X}")
    } else {
        format!("{id:03X}")
    };
    if remote {
        return format!("{id}#R\n");
    }
    let hex: String = data.iter().map(|b| format!("{b:02X}")).collect();
    format!("{id}#{hex}\n")
}

// ── SocketCAN (Linux-only) ──────────────────────────────────────

#[cfg(target_os = "linux")]
pub use linux::{SocketCanCapture, SocketCanTransport};

#[cfg(target_os = "linux")]
mod linux {
    use async_trait::async_trait;
    use socketcan::tokio::CanSocket;
    use socketcan::{CanFrame, EmbeddedFrame, Id, StandardId};

    use super::candump_line;
    use crate::error::{ProbeError, ProbeResult};
    use crate::transport::{CaptureSource, ProbeTransport};
    use crate::types::WireProbe;

    /// Sends remote frames on a SocketCAN interface (e.g. `can0`, `vcan0`).
    pub struct SocketCanTransport {
        interface_name: String,
        socket: CanSocket,
    }

    impl SocketCanTransport {
        /// Bind a raw CAN socket. Fails if the interface is missing or down.
        pub fn open(interface_name: &str) -> ProbeResult<Self> {
            let socket = CanSocket::open(interface_name)
                .map_err(|e| ProbeError::Interface(format!("{interface_name}: {e}")))?;
            tracing::debug!(interface = interface_name, "CAN socket bound");
            Ok(Self {
                interface_name: interface_name.to_string(),
                socket,
            })
        }
    }

    fn remote_frame(id: u16, dlc: u8) -> ProbeResult<CanFrame> {
        let std_id = StandardId::new(id)
            .ok_or_else(|| ProbeError::Config(format!("0x{id:X} is not a standard CAN ID")))?;
        CanFrame::new_remote(std_id, usize::from(dlc))
            .ok_or_else(|| ProbeError::Config(format!("invalid remote frame length {dlc}")))
    }

    #[async_trait]
    impl ProbeTransport for SocketCanTransport {
        fn name(&self) -> &str {
            &self.interface_name
        }

        async fn send(&self, probe: &WireProbe) -> ProbeResult<()> {
            let frame = match probe {
                WireProbe::RemoteFrame { id, dlc } => remote_frame(*id, *dlc)?,
                WireProbe::Bytes(_) => {
                    return Err(ProbeError::Send {
                        probe: probe.to_string(),
                        reason: "CAN transport only sends frames".into(),
                    });
                }
            };
            self.socket
                .write_frame(frame)
                .await
                .map_err(|e| ProbeError::Send {
                    probe: probe.to_string(),
                    reason: e.to_string(),
                })
        }

        fn open_capture(&self) -> ProbeResult<Option<Box<dyn CaptureSource>>> {
            let socket = CanSocket::open(&self.interface_name)
                .map_err(|e| ProbeError::Interface(format!("{}: {e}", self.interface_name)))?;
            Ok(Some(Box::new(SocketCanCapture { socket })))
        }
    }

    /// Receive side: one candump line per frame.
    pub struct SocketCanCapture {
        socket: CanSocket,
    }

    #[async_trait]
    impl CaptureSource for SocketCanCapture {
        async fn read_chunk(&mut self) -> ProbeResult<Option<Vec<u8>>> {
            let frame = self
                .socket
                .read_frame()
                .await
                .map_err(|e| ProbeError::Read(e.to_string()))?;
            let (id, extended) = match frame.id() {
                Id::Standard(id) => (u32::from(id.as_raw()), false),
                Id::Extended(id) => (id.as_raw(), true),
            };
            let line = candump_line(id, extended, frame.is_remote_frame(), frame.data());
            Ok(Some(line.into_bytes()))
        }
    }
}
