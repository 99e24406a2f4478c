// Background cleanup of expired persistent-store rows.
// Runs delete_expired on a fixed cadence until cancelled.
// Failures are logged and retried on the next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::facade::Cache;

/// Spawn the sweep loop. The first sweep runs one full `interval` after start.
pub fn spawn(cache: Cache, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "cache sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match cache.sweep().await {
                        Ok(removed) => debug!(removed, "scheduled cache sweep finished"),
                        Err(err) => warn!(error = %err, "scheduled cache sweep failed"),
                    }
                }
            }
        }

        info!("cache sweeper stopped");
    })
}

/// Cancel the sweep loop and wait for it. Returns `false` if the task panicked or was aborted.
pub async fn stop(task: JoinHandle<()>, shutdown: &CancellationToken) -> bool {
    shutdown.cancel();
    match task.await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "cache sweeper task ended abnormally");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, MemoryStore, Ttl};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_rows_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::from_backend(store.clone());
        store.set("gone", "v", Some(Ttl::ZERO)).await.unwrap();
        store.set("kept", "v", None).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = spawn(cache, Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 1);

        assert!(stop(task, &shutdown).await);
        assert_eq!(store.get("kept").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_stop_reports_panicked_task() {
        let shutdown = CancellationToken::new();
        let task: JoinHandle<()> = tokio::spawn(async { panic!("sweep loop crashed") });

        assert!(!stop(task, &shutdown).await);
        assert!(shutdown.is_cancelled());
    }
}
