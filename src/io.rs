//! Packet I/O adapters: thin wrappers converting between a byte-oriented
//! UDP socket and a packet-oriented interface, with optional tracing.

use std::io;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::packet::Packet;

/// Reads and writes `Packet`s over a connected UDP socket. "Connected"
/// pins the remote peer at the transport layer:
/// datagrams from any other address never reach `recv`.
#[derive(Clone)]
pub struct PacketIo {
    socket: Arc<UdpSocket>,
    buf_size: usize,
    trace: bool,
}

impl PacketIo {
    pub fn new(socket: Arc<UdpSocket>, buf_size: usize, trace: bool) -> Self {
        Self {
            socket,
            buf_size,
            trace,
        }
    }

    /// Receive one datagram and parse it. Returns the underlying socket
    /// error or the parse error on failure; both are treated as fatal by
    /// the reader task.
    pub async fn recv(&self) -> io::Result<Result<Packet, crate::packet::ParseError>> {
        let mut buf = vec![0u8; self.buf_size];
        let n = self.socket.recv(&mut buf).await?;
        let parsed = Packet::parse(&buf[..n]);
        if self.trace {
            match &parsed {
                Ok(p) => debug!(%p, "received"),
                Err(e) => debug!(error = %e, "received malformed datagram"),
            }
        }
        Ok(parsed)
    }

    /// Serialise and send one packet.
    pub async fn send(&self, packet: &Packet) -> io::Result<()> {
        let bytes = packet.serialise();
        self.socket.send(&bytes).await?;
        if self.trace {
            debug!(%packet, "sent");
        }
        Ok(())
    }
}
