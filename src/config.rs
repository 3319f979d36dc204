//! Configuration module for emu-bridge.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::bridge::listener::{detect_local_ip, DEFAULT_BACKLOG};
use crate::bridge::DEFAULT_CHUNK_SIZE;
use clap::Parser;
use serde::Deserialize;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the bridge
#[derive(Parser, Debug, Default)]
#[command(name = "emu-bridge")]
#[command(author = "emu-bridge authors")]
#[command(version = "0.1.0")]
#[command(about = "Socket and HTTP bridge for a locally running emulator", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// IP address the socket bridge binds to (auto-detected when omitted)
    #[arg(long)]
    pub host: Option<String>,

    /// Socket bridge port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// HTTP responder port
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Seconds to wait for a frame before giving up (negative = forever)
    #[arg(long, allow_negative_numbers = true)]
    pub run_time: Option<f64>,

    /// Shared-memory region to read once a frame announces a payload length
    #[arg(long)]
    pub region: Option<String>,

    /// Path to the emulator executable
    #[arg(long)]
    pub emulator: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Socket bridge configuration
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Address to bind to
    pub host: Option<String>,
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Seconds to wait in accept()
    pub accept_timeout: Option<f64>,
    /// Seconds to wait in a single receive
    pub receive_timeout: Option<f64>,
    /// Seconds to wait for a whole frame (negative = forever)
    #[serde(default = "default_run_time")]
    pub run_time: f64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_bridge_port(),
            backlog: default_backlog(),
            accept_timeout: None,
            receive_timeout: None,
            run_time: default_run_time(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// HTTP responder configuration
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

/// Payload handoff configuration
#[derive(Debug, Deserialize)]
pub struct PayloadConfig {
    /// Region name; payload reads are disabled without one
    pub region: Option<String>,
    /// Directory backing named shared-memory regions
    #[serde(default = "default_shm_dir")]
    pub dir: PathBuf,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            region: None,
            dir: default_shm_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct EmulatorConfig {
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bridge_port() -> u16 {
    9990
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

fn default_run_time() -> f64 {
    10.0
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    9876
}

fn default_shm_dir() -> PathBuf {
    PathBuf::from("/dev/shm")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub backlog: i32,
    pub accept_timeout: Option<Duration>,
    pub receive_timeout: Option<Duration>,
    pub run_time: Option<Duration>,
    pub chunk_size: usize,
    pub http_host: IpAddr,
    pub http_port: u16,
    pub region: Option<String>,
    pub shm_dir: PathBuf,
    pub emulator: Option<PathBuf>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values, resolving the bind address.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let host = match cli.host.or(toml_config.bridge.host) {
            Some(host) => parse_ip(&host)?,
            None => detect_local_ip(),
        };

        Ok(Config {
            host,
            port: cli.port.unwrap_or(toml_config.bridge.port),
            backlog: toml_config.bridge.backlog,
            accept_timeout: positive_seconds(toml_config.bridge.accept_timeout),
            receive_timeout: positive_seconds(toml_config.bridge.receive_timeout),
            run_time: run_time(cli.run_time.unwrap_or(toml_config.bridge.run_time)),
            chunk_size: toml_config.bridge.chunk_size.max(1),
            http_host: parse_ip(&toml_config.http.host)?,
            http_port: cli.http_port.unwrap_or(toml_config.http.port),
            region: cli.region.or(toml_config.payload.region),
            shm_dir: toml_config.payload.dir,
            emulator: cli.emulator.or(toml_config.emulator.path),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    pub fn bridge_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http_host, self.http_port)
    }

    /// Address the emulator should use for HTTP: the bridge IP when the
    /// responder listens on all interfaces.
    pub fn http_public_addr(&self) -> SocketAddr {
        if self.http_host.is_unspecified() {
            SocketAddr::new(self.host, self.http_port)
        } else {
            self.http_addr()
        }
    }
}

fn parse_ip(host: &str) -> Result<IpAddr, ConfigError> {
    if host == "localhost" {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    host.parse()
        .map_err(|e| ConfigError::InvalidAddress(host.to_string(), e))
}

/// Timeouts of zero or less mean "no timeout".
fn positive_seconds(secs: Option<f64>) -> Option<Duration> {
    secs.filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

/// A negative run time waits forever.
fn run_time(secs: f64) -> Option<Duration> {
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, #[source] AddrParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliArgs {
        CliArgs {
            host: Some("127.0.0.1".to_string()),
            log_level: "info".to_string(),
            ..CliArgs::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.bridge.port, 9990);
        assert_eq!(config.bridge.backlog, 10);
        assert_eq!(config.bridge.chunk_size, 4096);
        assert_eq!(config.http.port, 9876);
        assert!(config.payload.region.is_none());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [bridge]
            host = "192.168.178.39"
            port = 9999
            accept_timeout = 100
            run_time = -1

            [http]
            port = 8080

            [payload]
            region = "BizhawkTemp_main"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bridge.host.as_deref(), Some("192.168.178.39"));
        assert_eq!(config.bridge.port, 9999);
        assert_eq!(config.bridge.accept_timeout, Some(100.0));
        assert_eq!(config.bridge.run_time, -1.0);
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.payload.region.as_deref(), Some("BizhawkTemp_main"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_merge_defaults() {
        let config = Config::merge(cli(), TomlConfig::default()).unwrap();
        assert_eq!(config.bridge_addr(), "127.0.0.1:9990".parse().unwrap());
        assert_eq!(config.http_addr(), "0.0.0.0:9876".parse().unwrap());
        assert_eq!(config.http_public_addr(), "127.0.0.1:9876".parse().unwrap());
        assert_eq!(config.run_time, Some(Duration::from_secs(10)));
        assert_eq!(config.accept_timeout, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [bridge]
            port = 9999
            run_time = 3
            [logging]
            level = "warn"
            "#,
        )
        .unwrap();
        let args = CliArgs {
            port: Some(7000),
            run_time: Some(-1.0),
            log_level: "trace".to_string(),
            ..cli()
        };

        let config = Config::merge(args, toml_config).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.run_time, None);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_non_positive_timeouts_disable() {
        assert_eq!(positive_seconds(Some(0.0)), None);
        assert_eq!(positive_seconds(Some(-3.0)), None);
        assert_eq!(positive_seconds(Some(1.5)), Some(Duration::from_millis(1500)));
        assert_eq!(run_time(0.0), Some(Duration::ZERO));
    }

    #[test]
    fn test_invalid_host() {
        let args = CliArgs {
            host: Some("not-an-ip".to_string()),
            ..cli()
        };
        assert!(matches!(
            Config::merge(args, TomlConfig::default()),
            Err(ConfigError::InvalidAddress(..))
        ));
    }

    #[test]
    fn test_cli_parses_negative_run_time() {
        let args = CliArgs::try_parse_from(["emu-bridge", "--run-time", "-1", "-p", "9999"]).unwrap();
        assert_eq!(args.run_time, Some(-1.0));
        assert_eq!(args.port, Some(9999));
    }
}
