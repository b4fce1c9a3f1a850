//! Liveness reaper: periodic eviction of silent sessions.
//!
//! A single background task scans the session store on a fixed period and
//! force-disconnects any session whose last inbound frame is older than the
//! idle timeout. Eviction goes through the router's disconnect path, so the
//! room sees exactly the same leave processing as a clean close. The reaper
//! only ever removes sessions; it never blocks an active one.

use crate::router::{DisconnectReason, Router};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Evict every session idle longer than `idle_timeout`. Returns the number
/// of sessions evicted.
pub async fn sweep(router: &Router, idle_timeout: Duration) -> usize {
    let stale = router.hub().store.stale(idle_timeout);
    for sid in &stale {
        info!(%sid, "Evicting idle session");
        router
            .handle_disconnect(sid, DisconnectReason::IdleTimeout)
            .await;
    }
    stale.len()
}

/// Spawn the reaper task.
pub fn spawn_liveness_task(
    router: Router,
    sweep_interval: Duration,
    idle_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        // First tick fires immediately, we don't want that.
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = sweep(&router, idle_timeout).await;
            if evicted > 0 {
                info!(evicted, "Liveness sweep evicted idle sessions");
            }
        }
    })
}
