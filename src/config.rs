//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server identity.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listener configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Liveness eviction timers.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Queue and history bounds.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, used in logs only (e.g. "ember.example.net").
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: None,
        }
    }
}

fn default_server_name() -> String {
    "ember.local".to_string()
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to accept WebSocket connections on.
    #[serde(default = "default_listen_addr")]
    pub address: SocketAddr,
    /// Allowed `Origin` header values for the WebSocket handshake.
    /// Empty means any origin is accepted.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_addr(),
            allow_origins: Vec::new(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8700))
}

/// Liveness eviction configuration.
///
/// The reaper scans all sessions every `sweep_interval_secs` and evicts any
/// that have been silent longer than `idle_timeout_secs`. This is a coarse
/// server-side safety net; clients detect staleness faster through their
/// own application heartbeat. Both values are deployment knobs, not
/// protocol constants.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds between liveness sweeps (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds of silence before a session is evicted (default: 300).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl TimeoutsConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    300
}

/// Queue and history bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Outbound queue depth per connection; envelopes beyond this are
    /// dropped rather than stalling broadcast (default: 64).
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,

    /// Chat messages mirrored per room (default: 200).
    #[serde(default = "default_history_per_room")]
    pub history_per_room: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            send_queue: default_send_queue(),
            history_per_room: default_history_per_room(),
        }
    }
}

fn default_send_queue() -> usize {
    64
}

fn default_history_per_room() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.name, "ember.local");
        assert_eq!(config.timeouts.sweep_interval_secs, 60);
        assert_eq!(config.timeouts.idle_timeout_secs, 300);
        assert_eq!(config.limits.send_queue, 64);
        assert_eq!(config.limits.history_per_room, 200);
        assert!(config.listen.allow_origins.is_empty());
    }

    #[test]
    fn empty_toml_parses_to_defaults() {
        let config: Config = toml::from_str("").expect("parse failed");
        assert_eq!(config.listen.address, default_listen_addr());
        assert!(config.server.metrics_port.is_none());
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "chat.example.net"
            metrics_port = 0

            [timeouts]
            idle_timeout_secs = 120
            "#,
        )
        .expect("parse failed");

        assert_eq!(config.server.name, "chat.example.net");
        assert_eq!(config.server.metrics_port, Some(0));
        assert_eq!(config.timeouts.idle_timeout_secs, 120);
        // Unspecified fields keep defaults.
        assert_eq!(config.timeouts.sweep_interval_secs, 60);
        assert_eq!(config.limits.send_queue, 64);
    }

    #[test]
    fn durations_convert() {
        let timeouts = TimeoutsConfig::default();
        assert_eq!(timeouts.sweep_interval(), Duration::from_secs(60));
        assert_eq!(timeouts.idle_timeout(), Duration::from_secs(300));
    }
}
