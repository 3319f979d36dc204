//! Socket bridge between the emulator and this process.
//!
//! The emulator connects to a plain TCP port and pushes raw bytes. The
//! bridge loop assembles them into a [`Frame`] using the terminator
//! heuristic in [`frame`], answers each complete frame with `ack`, and
//! re-accepts whenever the peer goes away.
//!
//! State machine:
//!
//! ```text
//! Disconnected --accept--> ConnectedWaiting --chunk--> ConnectedWaiting
//!       ^                        |    |
//!       +------ close/reset -----+    +--terminator--> FrameComplete (ack sent)
//! ```
//!
//! A reconnect discards any partially received frame.

pub mod frame;
pub mod listener;
pub mod session;

pub use frame::{Frame, FrameAccumulator, DEFAULT_CHUNK_SIZE};
pub use listener::Listener;
pub use session::Session;

use crate::error::BridgeError;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reply sent on the session that delivered a terminating chunk.
pub const ACK: &[u8] = b"ack";

/// Source of new peer connections.
pub trait Acceptor {
    type Conn: Transport;

    /// Block until the next peer connects.
    fn accept(&mut self) -> Result<Self::Conn, BridgeError>;
}

/// One peer connection as seen by the bridge loop.
pub trait Transport {
    /// Receive up to `max_chunk` bytes; empty means the peer disconnected.
    fn receive(&mut self, max_chunk: usize, timeout: Option<Duration>)
        -> Result<Bytes, BridgeError>;

    /// Send all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl Acceptor for Listener {
    type Conn = Session;

    fn accept(&mut self) -> Result<Session, BridgeError> {
        Listener::accept(self)
    }
}

impl Transport for Session {
    fn receive(
        &mut self,
        max_chunk: usize,
        timeout: Option<Duration>,
    ) -> Result<Bytes, BridgeError> {
        Session::receive(self, max_chunk, timeout)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        Session::send(self, bytes)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(Session::peer_addr(self))
    }
}

/// Where the bridge loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No peer; the next step is `accept()`.
    Disconnected,
    /// A peer is connected and the current frame is still open.
    ConnectedWaiting,
    /// The last frame completed and was acknowledged.
    FrameComplete,
}

/// Tunables for the bridge loop.
#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    /// Upper bound for a single receive.
    pub chunk_size: usize,
    /// Per-receive deadline. Elapsing it is an error, unlike the run time.
    pub receive_timeout: Option<Duration>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            receive_timeout: None,
        }
    }
}

/// Orchestrates the acceptor, the single current session and the frame buffer.
pub struct Bridge<A: Acceptor> {
    acceptor: A,
    session: Option<A::Conn>,
    frame: FrameAccumulator,
    options: BridgeOptions,
    state: BridgeState,
}

impl<A: Acceptor> Bridge<A> {
    pub fn new(acceptor: A, options: BridgeOptions) -> Self {
        Self {
            acceptor,
            session: None,
            frame: FrameAccumulator::with_capacity(options.chunk_size),
            options,
            state: BridgeState::Disconnected,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn acceptor(&self) -> &A {
        &self.acceptor
    }

    /// Wait for the first peer.
    pub fn connect(&mut self) -> Result<(), BridgeError> {
        info!("Waiting for emulator to connect");
        self.reconnect()
    }

    /// Receive until one frame completes, or until `run_time` elapses.
    ///
    /// A complete frame has been acknowledged with [`ACK`] before it is
    /// returned. If `run_time` elapses first, the partial frame is returned
    /// with `is_complete == false` and nothing is sent. `None` waits forever.
    pub fn listen(&mut self, run_time: Option<Duration>) -> Result<Frame, BridgeError> {
        let deadline = run_time.map(|t| Instant::now() + t);
        self.frame.reset();
        if self.session.is_some() {
            self.state = BridgeState::ConnectedWaiting;
        }

        loop {
            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => return Ok(self.expire()),
                },
                None => None,
            };

            let (timeout, bounded_by_run_time) = match (self.options.receive_timeout, remaining) {
                (Some(receive), Some(left)) if left <= receive => (Some(left), true),
                (Some(receive), _) => (Some(receive), false),
                (None, Some(left)) => (Some(left), true),
                (None, None) => (None, false),
            };

            let received = match self.session.as_mut() {
                Some(session) => session.receive(self.options.chunk_size, timeout),
                None => {
                    self.reconnect()?;
                    continue;
                }
            };

            let chunk = match received {
                Ok(chunk) => chunk,
                Err(BridgeError::Timeout) if bounded_by_run_time => return Ok(self.expire()),
                Err(e) => {
                    if !matches!(e, BridgeError::Timeout) {
                        self.drop_session();
                    }
                    return Err(e);
                }
            };

            if chunk.is_empty() {
                info!(discarded = self.frame.len(), "reconnect");
                self.drop_session();
                self.reconnect()?;
                continue;
            }

            if self.frame.push(&chunk) {
                return self.acknowledge();
            }
            debug!(bytes = chunk.len(), total = self.frame.len(), "Socket received");
        }
    }

    fn acknowledge(&mut self) -> Result<Frame, BridgeError> {
        let sent = match self.session.as_mut() {
            Some(session) => session.send(ACK),
            None => Err(BridgeError::Send(std::io::ErrorKind::NotConnected.into())),
        };

        if let Err(e) = sent {
            warn!(error = %e, "Failed to acknowledge frame");
            self.drop_session();
            return Err(e);
        }

        self.state = BridgeState::FrameComplete;
        let frame = self.frame.finish(true);
        debug!(bytes = frame.len(), "Frame complete");
        Ok(frame)
    }

    fn expire(&mut self) -> Frame {
        let frame = self.frame.finish(false);
        debug!(bytes = frame.len(), "Run time elapsed without terminator");
        frame
    }

    fn drop_session(&mut self) {
        self.session = None;
        self.frame.reset();
        self.state = BridgeState::Disconnected;
    }

    fn reconnect(&mut self) -> Result<(), BridgeError> {
        let session = self.acceptor.accept()?;
        info!(peer = ?session.peer_addr(), "Emulator connected");
        // Replacing the option drops (and closes) any previous session.
        self.session = Some(session);
        self.state = BridgeState::ConnectedWaiting;
        Ok(())
    }
}
