//! Reconnect backoff policy.

use crate::config::ClientConfig;
use std::time::Duration;

/// Delay before reconnect attempt `n` (1-based): `base × 2^(n−1)`, capped
/// at the configured maximum. The cap keeps a long outage from producing
/// multi-minute waits while the budget is still open.
pub fn delay_for_attempt(config: &ClientConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = config
        .reconnect_base_delay
        .saturating_mul(1u32 << exponent);
    delay.min(config.reconnect_max_delay)
}
