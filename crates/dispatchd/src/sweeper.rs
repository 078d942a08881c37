//! Background purge of expired cache entries.
//!
//! Reads already hide expired entries; this loop reclaims their space.

use std::time::Duration;

use dispatchgrid_state::CacheStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct CacheSweeper {
    cache: CacheStore,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: CacheStore, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// One purge pass. Failures are logged and retried next tick.
    pub fn sweep(&self) -> u32 {
        match self.cache.purge_expired() {
            Ok(0) => 0,
            Ok(removed) => {
                debug!(removed, "expired cache entries purged");
                removed
            }
            Err(e) => {
                warn!(error = %e, "cache purge failed");
                0
            }
        }
    }

    /// Run the purge loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "cache sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep();
                }
                _ = shutdown.changed() => {
                    info!("cache sweeper shutting down");
                    break;
                }
            }
        }
    }
}
