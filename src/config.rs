//! Hub configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key has a default matching the
//! reference deployment.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::PresenceThresholds;
use crate::error::HubError;
use crate::service::TransportKind;
use crate::ws::session::SessionLimits;

/// Top-level hub configuration.
///
/// Loaded once at startup via [`HubConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address for the HTTP/WebSocket listener (e.g. `0.0.0.0:8088`).
    pub listen_addr: SocketAddr,

    /// Optional socket address for the line-delimited TCP listener.
    pub tcp_listen_addr: Option<SocketAddr>,

    /// Silence after which a device is flagged offline.
    pub offline_threshold: Duration,

    /// Silence after which a device is evicted.
    pub evict_threshold: Duration,

    /// Cadence of the presence sweep.
    pub sweep_interval: Duration,

    /// Idle time after which an observer connection is dropped.
    pub read_idle_timeout: Duration,

    /// Upper bound for one outbound write.
    pub write_timeout: Duration,

    /// Outbound frames buffered per connection.
    pub outbound_queue_capacity: usize,

    /// Largest accepted inbound frame, in bytes.
    pub max_frame_bytes: usize,

    /// Which transport delivers forwarded commands.
    pub command_transport: TransportKind,

    /// Connect/write timeout for command delivery.
    pub command_timeout: Duration,

    /// Whether rejected messages are answered with an `error` message.
    pub rejection_replies: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8088)),
            tcp_listen_addr: None,
            offline_threshold: Duration::from_secs(30),
            evict_threshold: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(10),
            read_idle_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(5),
            outbound_queue_capacity: 256,
            max_frame_bytes: 64 * 1024,
            command_transport: TransportKind::Log,
            command_timeout: Duration::from_secs(5),
            rejection_replies: false,
        }
    }
}

impl HubConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] if an address or the command transport
    /// cannot be parsed, or if the resulting values are inconsistent.
    pub fn from_env() -> Result<Self, HubError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => parse_addr("LISTEN_ADDR", &raw)?,
            Err(_) => defaults.listen_addr,
        };
        let tcp_listen_addr = match std::env::var("TCP_LISTEN_ADDR") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_addr("TCP_LISTEN_ADDR", &raw)?),
            _ => None,
        };
        let command_transport = match std::env::var("COMMAND_TRANSPORT") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.command_transport,
        };

        let config = Self {
            listen_addr,
            tcp_listen_addr,
            offline_threshold: parse_secs("OFFLINE_THRESHOLD_SECS", defaults.offline_threshold),
            evict_threshold: parse_secs("EVICT_THRESHOLD_SECS", defaults.evict_threshold),
            sweep_interval: parse_secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            read_idle_timeout: parse_secs("READ_IDLE_TIMEOUT_SECS", defaults.read_idle_timeout),
            write_timeout: parse_secs("WRITE_TIMEOUT_SECS", defaults.write_timeout),
            outbound_queue_capacity: parse_env(
                "OUTBOUND_QUEUE_CAPACITY",
                defaults.outbound_queue_capacity,
            ),
            max_frame_bytes: parse_env("MAX_FRAME_BYTES", defaults.max_frame_bytes),
            command_transport,
            command_timeout: parse_secs("COMMAND_TIMEOUT_SECS", defaults.command_timeout),
            rejection_replies: parse_env_bool("REJECTION_REPLIES", defaults.rejection_replies),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values are usable together.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] if a duration or size is zero, or the
    /// eviction threshold does not exceed the offline threshold.
    pub fn validate(&self) -> Result<(), HubError> {
        let non_zero = [
            ("OFFLINE_THRESHOLD_SECS", self.offline_threshold),
            ("SWEEP_INTERVAL_SECS", self.sweep_interval),
            ("READ_IDLE_TIMEOUT_SECS", self.read_idle_timeout),
            ("WRITE_TIMEOUT_SECS", self.write_timeout),
            ("COMMAND_TIMEOUT_SECS", self.command_timeout),
        ];
        for (key, value) in non_zero {
            if value.is_zero() {
                return Err(HubError::Config(format!("{key} must be greater than zero")));
            }
        }
        if self.evict_threshold <= self.offline_threshold {
            return Err(HubError::Config(
                "EVICT_THRESHOLD_SECS must exceed OFFLINE_THRESHOLD_SECS".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 || self.max_frame_bytes == 0 {
            return Err(HubError::Config(
                "OUTBOUND_QUEUE_CAPACITY and MAX_FRAME_BYTES must be greater than zero"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Presence thresholds for the registry.
    #[must_use]
    pub const fn thresholds(&self) -> PresenceThresholds {
        PresenceThresholds {
            offline: self.offline_threshold,
            evict: self.evict_threshold,
        }
    }

    /// I/O bounds for observer connections.
    #[must_use]
    pub const fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            read_idle_timeout: self.read_idle_timeout,
            write_timeout: self.write_timeout,
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

fn parse_addr(key: &str, raw: &str) -> Result<SocketAddr, HubError> {
    raw.trim()
        .parse()
        .map_err(|e| HubError::Config(format!("{key}={raw:?} is not a socket address: {e}")))
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding whole seconds.
fn parse_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env(key, default.as_secs()))
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
