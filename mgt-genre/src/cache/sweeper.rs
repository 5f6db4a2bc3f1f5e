//! Optional background purge of expired cache entries
//!
//! Read-time expiry stays authoritative; the sweeper only bounds memory.

use super::ResponseCache;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to a running sweeper task
pub struct CacheSweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Spawn a task purging `cache` every `interval`
    pub fn spawn(cache: ResponseCache, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Cache sweeper cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired().await;
                        if removed > 0 {
                            debug!(removed, "Purged expired cache entries");
                        }
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "Cache sweeper started");
        Self { cancel, handle }
    }

    /// Stop the task and wait for it to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
