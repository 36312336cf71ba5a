//! Background task that periodically drops expired entries from a [`CacheStore`].

use crate::store::CacheStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Purge expired entries every `interval` until `shutdown` is cancelled.
///
/// The first purge runs one full interval after start. Cancellation is
/// checked before every tick, so a cancelled sweeper never purges again.
///
/// Panics if `interval` is zero.
pub async fn run_sweeper(store: Arc<CacheStore>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_ms = interval.as_millis() as u64, "sweeper started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = store.purge_expired(Instant::now());
                if removed > 0 {
                    tracing::info!(removed, remaining = store.len(), "purged expired entries");
                } else {
                    tracing::debug!("sweep found nothing to purge");
                }
            }
        }
    }

    tracing::info!("sweeper stopped");
}

/// Spawn [`run_sweeper`] on the current runtime.
pub fn spawn_sweeper(
    store: Arc<CacheStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_sweeper(store, interval, shutdown))
}
