//! HTTP responder polled by the emulator.
//!
//! Stateless and independent of the socket bridge: it runs on its own thread
//! with a single-threaded Tokio runtime and shares nothing with the bridge
//! loop.
//!
//! ## Responses
//!
//! ```text
//! GET   -> 200, HTTP/1.1, <html><body><h1>hi!</h1></body></html>
//! HEAD  -> 200, HTTP/1.0, headers only
//! POST  -> 200, HTTP/1.1, Connection: keep-alive, <html><body>OK</body></html>
//! other -> 501
//! ```

pub mod handler;
pub mod parser;

pub use handler::handle_connection;

use std::io;
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Body returned for `GET`.
pub const GET_BODY: &[u8] = b"<html><body><h1>hi!</h1></body></html>";

/// Body returned for `POST`.
pub const POST_BODY: &[u8] = b"<html><body>OK</body></html>";

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("emu-bridge/", env!("CARGO_PKG_VERSION"));

/// Handle to the running responder thread.
pub struct Responder {
    local_addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl Responder {
    /// Bind `addr` on the calling thread, then serve from a new thread.
    ///
    /// Binding up front means an unavailable port fails startup instead of
    /// being logged from the background.
    pub fn spawn(addr: SocketAddr) -> io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let handle = thread::Builder::new()
            .name("http".to_string())
            .spawn(move || {
                if let Err(e) = serve(listener) {
                    error!(error = %e, "HTTP responder failed");
                }
            })?;

        info!(address = %local_addr, "HTTP responder listening");
        Ok(Self {
            local_addr,
            _handle: handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn serve(listener: std::net::TcpListener) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let listener = {
        let _guard = runtime.enter();
        TcpListener::from_std(listener)?
    };

    runtime.block_on(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New HTTP connection");

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream).await {
                            debug!(error = %e, "HTTP connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept HTTP connection");
                }
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    #[test]
    fn test_responder_serves_get_over_tcp() {
        let responder = Responder::spawn("127.0.0.1:0".parse().unwrap()).unwrap();

        let mut stream = TcpStream::connect(responder.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(GET_BODY));
    }

    #[test]
    fn test_responder_bind_conflict() {
        let first = Responder::spawn("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(Responder::spawn(first.local_addr()).is_err());
    }
}
