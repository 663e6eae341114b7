//! Background staleness sweep.
//!
//! Periodically looks for domains whose last committed state is `success`
//! but whose cache entry has gone stale (or been evicted), and asks for a
//! non-forced background refresh of each.
//!
//! Domains that are `loading` already have a fetch outstanding. Domains in
//! `error` are left for the consumer to retry explicitly.
//!
//! # Example
//!
//! ```ignore
//! let monitor = StalenessMonitor::new(store, cache, interval, refresh);
//! let handle = monitor.spawn();
//! // ...
//! handle.stop();
//! ```

use crate::store::StateStore;
use dashsync_cache::CacheLayer;
use dashsync_model::{DomainKey, Status};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Callback that starts a non-forced refresh of one domain
pub type RefreshFn = Arc<dyn Fn(DomainKey) + Send + Sync>;

/// Periodic sweep over the state store
pub struct StalenessMonitor<T> {
    store: Arc<StateStore<T>>,
    cache: CacheLayer<T>,
    interval: Duration,
    refresh: RefreshFn,
}

impl<T> std::fmt::Debug for StalenessMonitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StalenessMonitor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl<T> StalenessMonitor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create monitor
    pub fn new(
        store: Arc<StateStore<T>>,
        cache: CacheLayer<T>,
        interval: Duration,
        refresh: RefreshFn,
    ) -> Self {
        Self {
            store,
            cache,
            interval,
            refresh,
        }
    }

    /// Domains in `success` whose cache entry is stale or gone
    #[must_use]
    pub fn stale_domains(&self) -> Vec<DomainKey> {
        self.store
            .keys_with_status(Status::Success)
            .into_iter()
            .filter(|key| self.cache.peek(key).map_or(true, |entry| entry.is_stale()))
            .collect()
    }

    /// Run one sweep, returning the number of refreshes requested
    pub fn sweep(&self) -> usize {
        let stale = self.stale_domains();
        for key in &stale {
            debug!(key = %key, "stale domain, requesting refresh");
            (self.refresh)(key.clone());
        }
        stale.len()
    }

    /// Sweep every interval until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "staleness monitor starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        // first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("staleness monitor shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let refreshed = self.sweep();
                    if refreshed > 0 {
                        info!(refreshed, "staleness sweep requested refreshes");
                    }
                }
            }
        }
    }

    /// Spawn the sweep loop onto the current runtime
    #[must_use]
    pub fn spawn(self) -> MonitorHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        MonitorHandle { shutdown, task }
    }
}

/// Stop handle for a spawned [`StalenessMonitor`]
///
/// Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the loop to exit
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Check whether the loop is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop and wait for the loop to exit
    pub async fn join(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
