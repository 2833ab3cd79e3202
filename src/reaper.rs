//! Reaper (C8): periodically promotes disconnected clients to obsolete and
//! deletes them (spec.md §4.8).
//!
//! Grounded on the teacher's periodic-task spawn pattern (a `tokio::spawn`
//! loop with `tokio::time::interval`, checked against a shutdown signal).

use crate::state::Fleet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Spawn the reaper as a background task. Ticks every
/// `config.retention.reaper_period`, calling `ClientStore::delete_obsolete`.
/// Returns a handle whose `shutdown_tx` stops the loop cleanly.
pub fn spawn(fleet: Arc<Fleet>) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let period = fleet.config.retention.reaper_period();

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_once(&fleet).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("reaper shutting down");
                        break;
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}

async fn run_once(fleet: &Fleet) {
    let now = chrono::Utc::now();
    let keep = fleet.keep_disconnected_clients();
    match fleet.clients.delete_obsolete(now, keep).await {
        Ok(0) => debug!("reaper tick: nothing to reap"),
        Ok(n) => {
            crate::metrics::CLIENTS_OBSOLETE_REAPED.inc_by(n as u64);
            info!(count = n, "reaper deleted obsolete clients")
        }
        Err(e) => tracing::error!(error = %e, "reaper tick failed"),
    }

    crate::metrics::CLIENTS_ACTIVE.set(fleet.clients.count_active() as i64);
    crate::metrics::CLIENTS_DISCONNECTED.set(fleet.clients.count_disconnected(now, keep) as i64);
}
