//! Client configuration.

use std::time::Duration;

/// Configuration for a [`crate::RoomClient`].
///
/// The only required field is `server_url`; all others have defaults
/// matching the protocol's design values.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8700`.
    pub server_url: String,

    /// How long to wait for the transport to open and the join to be
    /// acknowledged (default: 10s).
    pub join_timeout: Duration,

    /// Interval between application-level `ping` frames (default: 30s).
    pub heartbeat_interval: Duration,

    /// How long to wait for `pong` before treating the connection as dead
    /// (default: 5s).
    pub heartbeat_timeout: Duration,

    /// Base reconnect delay; attempt n waits `base × 2^(n−1)` (default: 1s).
    pub reconnect_base_delay: Duration,

    /// Upper bound on the reconnect delay (default: 30s).
    pub reconnect_max_delay: Duration,

    /// Reconnect attempts before giving up and entering simulation
    /// (default: 5).
    pub reconnect_budget: u32,

    /// Capacity of the bounded event channel (default: 256).
    pub event_capacity: usize,

    /// Bounds for the randomized delay between fabricated simulation
    /// events (defaults: 4s–15s).
    pub simulation_min_delay: Duration,
    pub simulation_max_delay: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_budget: 5,
            event_capacity: 256,
            simulation_min_delay: Duration::from_secs(4),
            simulation_max_delay: Duration::from_secs(15),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, base_delay: Duration, max_delay: Duration, budget: u32) -> Self {
        self.reconnect_base_delay = base_delay;
        self.reconnect_max_delay = max_delay;
        self.reconnect_budget = budget;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_simulation_delays(mut self, min: Duration, max: Duration) -> Self {
        self.simulation_min_delay = min;
        self.simulation_max_delay = max.max(min);
        self
    }
}
