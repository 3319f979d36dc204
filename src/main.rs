//! emu-bridge: connects a locally running emulator to this machine
//!
//! Two independent channels:
//! - Socket bridge: the emulator pushes raw byte frames over TCP and gets
//!   `ack` back for every complete frame
//! - HTTP responder: answers the emulator's GET/POST polling with canned pages
//!
//! Features:
//! - Transparent reconnect when the emulator goes away
//! - Optional payload handoff through a named shared-memory region
//! - Configuration via CLI arguments or TOML file

mod bridge;
mod config;
mod emulator;
mod error;
mod http;
mod payload;

use bridge::{Bridge, BridgeOptions, Frame, Listener};
use config::Config;
use error::BridgeError;
use payload::RegionReader;
use std::net::SocketAddr;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        bridge = %config.bridge_addr(),
        http = %config.http_addr(),
        run_time = ?config.run_time,
        region = ?config.region,
        "Starting emu-bridge"
    );

    match emulator::discover(config.emulator.as_deref()) {
        Ok(path) => info!(path = %path.display(), "Using emulator executable"),
        Err(e) => warn!(error = %e, "Emulator executable not found"),
    }

    let responder = http::Responder::spawn(config.http_addr())?;

    let listener = Listener::bind(config.bridge_addr(), config.backlog, config.accept_timeout)?;
    let mut bridge = Bridge::new(
        listener,
        BridgeOptions {
            chunk_size: config.chunk_size,
            receive_timeout: config.receive_timeout,
        },
    );

    print_connection_info(
        bridge.acceptor().local_addr(),
        SocketAddr::new(config.http_public_addr().ip(), responder.local_addr().port()),
    );

    let reader = config.region.as_ref().map(|region| {
        let reader = RegionReader::new(&config.shm_dir);
        info!(region = %region, dir = %reader.dir().display(), "Payload handoff enabled");
        (reader, region.as_str())
    });

    if let Err(e) = bridge.connect() {
        warn!(error = %e, "Initial connect failed, will keep waiting");
    }

    loop {
        match bridge.listen(config.run_time) {
            Ok(frame) => handle_frame(&frame, reader.as_ref()),
            Err(BridgeError::Timeout) => debug!(state = ?bridge.state(), "Timed out waiting for peer"),
            Err(e) => warn!(state = ?bridge.state(), error = %e, "Bridge error"),
        }
    }
}

/// Tell the user what to point the emulator at.
fn print_connection_info(bridge: SocketAddr, http: SocketAddr) {
    println!("Configure the emulator with:");
    println!("  socket ip:   {}", bridge.ip());
    println!("  socket port: {}", bridge.port());
    println!("  GET url:     http://{http}/");
    println!("  POST url:    http://{http}/");
}

fn handle_frame(frame: &Frame, reader: Option<&(RegionReader, &str)>) {
    if !frame.is_complete {
        if !frame.is_empty() {
            warn!(bytes = frame.len(), "Discarding incomplete frame");
        }
        return;
    }

    info!(bytes = frame.len(), "Frame received");
    debug!(frame = ?frame.bytes, "Frame contents");

    if let Some((reader, region)) = reader {
        match reader.fetch(frame, region) {
            Ok(data) => {
                info!(region = %region, bytes = data.len(), "Payload read");
                debug!(payload = ?data, "Payload contents");
            }
            Err(e) => warn!(region = %region, error = %e, "Payload read failed"),
        }
    }
}
