//! Listening socket for the bridge.
//!
//! The emulator is the only peer we ever talk to, so the listener hands out
//! one [`Session`] per `accept()` and leaves it to the bridge loop to drop
//! the previous one.

use crate::bridge::session::Session;
use crate::error::BridgeError;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::time::Duration;
use tracing::{debug, info};

/// Default pending-connection queue length.
pub const DEFAULT_BACKLOG: i32 = 10;

/// Bound TCP listener with an optional accept deadline.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local: SocketAddr,
    accept_timeout: Option<Duration>,
}

impl Listener {
    /// Create, bind and listen on `addr`.
    pub fn bind(
        addr: SocketAddr,
        backlog: i32,
        accept_timeout: Option<Duration>,
    ) -> Result<Self, BridgeError> {
        let bind_err = |source: io::Error| BridgeError::Bind { addr, source };

        let inner = create_listener(addr, backlog, accept_timeout).map_err(bind_err)?;
        let local = inner.local_addr().map_err(bind_err)?;

        info!(address = %local, backlog, "Socket bridge listening");

        Ok(Self {
            inner,
            local,
            accept_timeout,
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Block until a peer connects.
    ///
    /// Fails with [`BridgeError::Timeout`] if an accept timeout is set and
    /// nobody connects in time.
    pub fn accept(&self) -> Result<Session, BridgeError> {
        let (stream, peer) = loop {
            match self.inner.accept() {
                Ok(accepted) => break accepted,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BridgeError::from_timed(e, BridgeError::Accept)),
            }
        };

        // Accepted sockets may inherit the listener's receive timeout.
        if self.accept_timeout.is_some() {
            stream.set_read_timeout(None).map_err(BridgeError::Accept)?;
        }
        stream.set_nodelay(true).map_err(BridgeError::Accept)?;

        debug!(peer = %peer, "Accepted connection");
        Ok(Session::new(stream, peer))
    }
}

fn create_listener(
    addr: SocketAddr,
    backlog: i32,
    accept_timeout: Option<Duration>,
) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    // SO_RCVTIMEO on a listening socket bounds accept()
    socket.set_read_timeout(accept_timeout)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// Best guess at this host's primary IPv4 address.
///
/// Connecting a UDP socket only selects a route; nothing is sent. Falls back
/// to loopback when there is no route.
pub fn detect_local_ip() -> IpAddr {
    let probe = || -> io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
