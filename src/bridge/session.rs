//! A single accepted peer connection.
//!
//! Sessions are blocking: `receive` waits for data, a disconnect or the
//! optional deadline; `send` writes everything or fails.

use crate::error::BridgeError;
use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::trace;

/// Smallest timeout handed to the socket; a zero read timeout is rejected by the OS API.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// The accepted connection and its peer.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Session {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Receive up to `max_chunk` bytes.
    ///
    /// An empty result means the peer is gone; connection resets are folded
    /// into that case. `timeout = None` blocks indefinitely.
    pub fn receive(
        &mut self,
        max_chunk: usize,
        timeout: Option<Duration>,
    ) -> Result<Bytes, BridgeError> {
        self.stream
            .set_read_timeout(timeout.map(|t| t.max(MIN_TIMEOUT)))
            .map_err(BridgeError::Receive)?;

        let mut buf = BytesMut::zeroed(max_chunk);
        loop {
            match self.stream.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    trace!(peer = %self.peer, bytes = n, "Received chunk");
                    return Ok(buf.freeze());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    trace!(peer = %self.peer, error = %e, "Connection reset by peer");
                    return Ok(Bytes::new());
                }
                Err(e) => return Err(BridgeError::from_timed(e, BridgeError::Receive)),
            }
        }
    }

    /// Write all of `bytes` to the peer.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.stream.write_all(bytes).map_err(BridgeError::Send)?;
        self.stream.flush().map_err(BridgeError::Send)
    }
}
