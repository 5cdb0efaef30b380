//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Base URL of the simulation engine API (`/map`, `/stream`, `/control`, `/incident`)
    pub upstream_url: String,
    /// Fixed delay between stream reconnect attempts
    pub reconnect_delay: Duration,
    /// Timeout for map fetches and command posts (not applied to the stream)
    pub upstream_timeout: Duration,
    /// Ceiling for a buffered, not yet terminated stream line
    pub max_line_bytes: usize,

    /// Outbound queue depth per viewer (oldest entries dropped when full)
    pub session_queue_capacity: usize,
    /// Maximum state updates per second sent to a single viewer
    pub broadcast_rate_hz: u32,
    /// Send the last known state to a viewer as soon as it subscribes
    pub snapshot_on_join: bool,
    /// Re-fetch the map from upstream whenever a viewer connects
    pub refetch_map_on_connect: bool,

    /// Pending command queue depth in front of the forwarder
    pub command_queue_capacity: usize,

    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            log_level: "info".to_string(),
            upstream_url: "http://localhost:8080/api".to_string(),
            reconnect_delay: Duration::from_millis(2000),
            upstream_timeout: Duration::from_millis(5000),
            max_line_bytes: 1024 * 1024,
            session_queue_capacity: 4,
            broadcast_rate_hz: 20,
            snapshot_on_join: true,
            refetch_map_on_connect: true,
            command_queue_capacity: 256,
            client_origin: "*".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        let upstream_url = env::var("UPSTREAM_URL")
            .unwrap_or(defaults.upstream_url)
            .trim_end_matches('/')
            .to_string();
        if !upstream_url.starts_with("http://") && !upstream_url.starts_with("https://") {
            return Err(ConfigError::Invalid("UPSTREAM_URL"));
        }

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            upstream_url,
            reconnect_delay: Duration::from_millis(parse_or(
                "RECONNECT_DELAY_MS",
                defaults.reconnect_delay.as_millis() as u64,
            )?),
            upstream_timeout: Duration::from_millis(parse_or(
                "UPSTREAM_TIMEOUT_MS",
                defaults.upstream_timeout.as_millis() as u64,
            )?),
            max_line_bytes: parse_or("MAX_LINE_BYTES", defaults.max_line_bytes)?,

            session_queue_capacity: parse_or(
                "SESSION_QUEUE_CAPACITY",
                defaults.session_queue_capacity,
            )?,
            broadcast_rate_hz: parse_or("BROADCAST_RATE_HZ", defaults.broadcast_rate_hz)?,
            snapshot_on_join: parse_or("SNAPSHOT_ON_JOIN", defaults.snapshot_on_join)?,
            refetch_map_on_connect: parse_or(
                "REFETCH_MAP_ON_CONNECT",
                defaults.refetch_map_on_connect,
            )?,

            command_queue_capacity: parse_or(
                "COMMAND_QUEUE_CAPACITY",
                defaults.command_queue_capacity,
            )?,

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or(defaults.client_origin),
        };

        if config.session_queue_capacity == 0 {
            return Err(ConfigError::Invalid("SESSION_QUEUE_CAPACITY"));
        }
        if config.command_queue_capacity == 0 {
            return Err(ConfigError::Invalid("COMMAND_QUEUE_CAPACITY"));
        }

        Ok(config)
    }
}

/// Parse an optional variable, using `default` when it is unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
