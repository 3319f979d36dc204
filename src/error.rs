//! Error types for the socket bridge.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced by the listener, session and bridge loop.
///
/// A peer disconnect is not represented here: it shows up as an empty
/// receive and drives a reconnect instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The listening address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// `accept()` failed for a reason other than a timeout.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// Reading from the session failed.
    #[error("failed to receive from peer: {0}")]
    Receive(#[source] io::Error),

    /// The acknowledgment could not be written (usually a broken pipe).
    #[error("failed to send to peer: {0}")]
    Send(#[source] io::Error),

    /// An accept or receive deadline elapsed.
    #[error("timed out waiting for peer")]
    Timeout,
}

impl BridgeError {
    /// Map an I/O error from a timed operation, folding the platform's
    /// timeout kinds into [`BridgeError::Timeout`].
    pub(crate) fn from_timed(err: io::Error, wrap: fn(io::Error) -> BridgeError) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => BridgeError::Timeout,
            _ => wrap(err),
        }
    }
}
