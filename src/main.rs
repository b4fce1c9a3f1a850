//! emberd - ephemeral room chat daemon.
//!
//! Routes JSON envelope events between unauthenticated participants grouped
//! by short-lived room codes over WebSocket. All state is memory-resident
//! and lost on restart; rooms live exactly as long as their last member.

mod config;
mod error;
mod history;
mod http;
mod liveness;
mod metrics;
mod network;
mod router;
mod state;

use crate::config::Config;
use crate::history::MemoryHistory;
use crate::liveness::spawn_liveness_task;
use crate::network::Gateway;
use crate::router::Router;
use crate::state::Hub;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        "Starting emberd"
    );

    let history = Arc::new(MemoryHistory::new(config.limits.history_per_room));
    let hub = Arc::new(Hub::new(config.limits.send_queue, history));
    let router = Router::new(hub);

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    // Start the liveness reaper
    spawn_liveness_task(
        router.clone(),
        config.timeouts.sweep_interval(),
        config.timeouts.idle_timeout(),
    );
    info!(
        sweep_secs = config.timeouts.sweep_interval_secs,
        idle_secs = config.timeouts.idle_timeout_secs,
        "Liveness reaper started"
    );

    // Start the Gateway
    let gateway = Gateway::bind(config.listen, router).await?;
    gateway.run().await?;

    Ok(())
}
