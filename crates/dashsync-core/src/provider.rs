//! Provider-scoped synchronization registry
//!
//! A [`SyncProvider`] owns one cache, one coordinator, one state store, the
//! staleness monitor and the error channel. Rendering code holds a provider
//! (it is cheap to clone) and reaches domains through
//! [`SyncProvider::subscribe`].
//!
//! ```text
//! subscribe ──► DomainSubscription ──refetch──┐
//!                     ▲                       ▼
//!                 watch::Receiver        SyncProvider::load
//!                     │                   │ begin(attempt)
//!                 StateStore ◄── commit ──┤
//!                                         ▼
//!                              RequestCoordinator ──► DomainFetcher
//! ```

use crate::config::SyncConfig;
use crate::coordinator::{CoordinatorStats, FetchHandle, FetchOptions, RequestCoordinator};
use crate::error::ConfigError;
use crate::hook::{DomainSubscription, HookOptions};
use crate::monitor::{MonitorHandle, RefreshFn, StalenessMonitor};
use crate::store::{Action, Slot, StateStore};
use dashsync_cache::{CacheLayer, CacheStats};
use dashsync_model::{
    DataFetchError, DataState, DomainData, DomainFetcher, DomainKey, FetchError, Status,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the error notification channel
pub const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Published once for every attempt that ends in `error`
#[derive(Debug, Clone)]
pub struct ErrorNotice {
    /// Domain that failed
    pub key: DomainKey,
    /// Classified failure
    pub error: DataFetchError,
    /// Attempt number within the domain
    pub attempt: u64,
}

struct Inner {
    config: SyncConfig,
    fetcher: Arc<dyn DomainFetcher>,
    coordinator: RequestCoordinator<DomainData>,
    store: Arc<StateStore<DomainData>>,
    notices: broadcast::Sender<ErrorNotice>,
    monitor: Mutex<Option<MonitorHandle>>,
    shutdown: CancellationToken,
    // orders attempt numbers the same way as coordinator registrations
    gate: Mutex<()>,
}

/// Handle to one synchronization scope
#[derive(Clone)]
pub struct SyncProvider {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProvider")
            .field("config", &self.inner.config)
            .field("coordinator", &self.inner.coordinator)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

type CommitTask = JoinHandle<Result<DomainData, DataFetchError>>;

enum Start {
    Cached(DomainData),
    // coalesced onto the attempt that owns the in-flight fetch
    Joined(FetchHandle<DomainData>),
    // new attempt; its commit task runs whether or not the caller waits
    Begun(CommitTask),
}

impl SyncProvider {
    /// Create a provider and start its staleness monitor
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// `ConfigError::Invalid` if `config` fails validation
    pub fn create(config: SyncConfig, fetcher: impl DomainFetcher) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = CacheLayer::new(config.cache_capacity);
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let provider = Self {
            inner: Arc::new(Inner {
                fetcher: Arc::new(fetcher),
                coordinator: RequestCoordinator::new(cache),
                store: Arc::new(StateStore::new()),
                notices,
                monitor: Mutex::new(None),
                shutdown: CancellationToken::new(),
                gate: Mutex::new(()),
                config,
            }),
        };

        let handle = provider.staleness_monitor().spawn();
        *provider.inner.monitor.lock() = Some(handle);

        info!(
            ttl_ms = provider.inner.config.default_ttl_ms,
            sweep_interval_ms = provider.inner.config.sweep_interval_ms,
            "sync provider created"
        );
        Ok(provider)
    }

    /// Stop the monitor and cancel every outstanding fetch
    ///
    /// Idempotent. Later loads fail with a cancellation error.
    pub fn dispose(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        if let Some(handle) = self.inner.monitor.lock().take() {
            handle.stop();
        }
        let cancelled = self.inner.coordinator.cancel_all();
        info!(cancelled, "sync provider disposed");
    }

    /// Check whether [`SyncProvider::dispose`] ran
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Subscribe to a domain
    #[must_use]
    pub fn subscribe(&self, key: DomainKey, options: HookOptions) -> DomainSubscription {
        DomainSubscription::new(self.clone(), key, options)
    }

    /// Load `key` and commit the outcome to its state
    ///
    /// Without `force`, a domain that is already in `success` with a fresh
    /// cache entry is answered from the cache and its state is left alone.
    /// Dropping the returned future does not abandon the attempt; its outcome
    /// is committed by a background task either way.
    ///
    /// # Errors
    /// The classified failure. Cancellation errors (superseded attempts,
    /// disposal) are returned but not committed.
    pub async fn load(&self, key: &DomainKey, force: bool) -> Result<DomainData, DataFetchError> {
        match self.start(key, force)? {
            Start::Cached(data) => Ok(data),
            Start::Joined(handle) => handle.await,
            Start::Begun(task) => task.await.unwrap_or_else(|join_error| {
                Err(DataFetchError::classify(
                    key,
                    &FetchError::Other(format!("commit task aborted: {join_error}")),
                ))
            }),
        }
    }

    /// Begin a load now and finish it in the background
    ///
    /// Returns `None` when nothing new needed to run.
    pub fn spawn_load(&self, key: DomainKey, force: bool) -> Option<CommitTask> {
        match self.start(&key, force) {
            Ok(Start::Begun(task)) => Some(task),
            Ok(Start::Cached(_) | Start::Joined(_)) | Err(_) => None,
        }
    }

    fn start(&self, key: &DomainKey, force: bool) -> Result<Start, DataFetchError> {
        if self.is_disposed() {
            return Err(DataFetchError::cancelled(key, "provider disposed"));
        }
        let _gate = self.inner.gate.lock();
        if !force && self.inner.store.status(key) == Status::Success {
            if let Some(data) = self.inner.coordinator.cache().get_fresh(key) {
                debug!(key = %key, "fresh data already committed");
                return Ok(Start::Cached(data));
            }
        }
        if !force && self.inner.coordinator.is_in_flight(key) {
            debug!(key = %key, "joining attempt in progress");
            return Ok(Start::Joined(self.request(key, false)));
        }

        let attempt = self.inner.store.begin(key);
        let handle = self.request(key, force);
        let provider = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move { provider.finish(&task_key, attempt, handle).await });
        Ok(Start::Begun(task))
    }

    fn request(&self, key: &DomainKey, force: bool) -> FetchHandle<DomainData> {
        let inner = &self.inner;
        let options = FetchOptions::new(inner.config.timeouts.for_key(key), inner.config.ttl())
            .with_force_refresh(force)
            .with_signal(inner.shutdown.clone());

        let fetcher = Arc::clone(&inner.fetcher);
        let fetch_key = key.clone();
        inner.coordinator.request(
            key,
            move |signal| async move {
                let payload = fetcher.fetch(&fetch_key, signal).await?;
                DomainData::decode(&fetch_key, payload)
            },
            options,
        )
    }

    async fn finish(
        &self,
        key: &DomainKey,
        attempt: u64,
        handle: FetchHandle<DomainData>,
    ) -> Result<DomainData, DataFetchError> {
        let inner = &self.inner;
        let result = handle.await;

        match &result {
            Ok(data) => {
                inner
                    .store
                    .commit(key, attempt, Action::Succeeded(data.clone()));
            }
            Err(error) if error.is_cancelled() => {
                debug!(key = %key, attempt, "attempt cancelled, state untouched");
            }
            Err(error) => {
                if inner.store.commit(key, attempt, Action::Failed(error.clone())) {
                    warn!(
                        key = %key,
                        attempt,
                        retryable = error.retryable,
                        "domain entered error state: {}",
                        error.message
                    );
                    let _ = inner.notices.send(ErrorNotice {
                        key: key.clone(),
                        error: error.clone(),
                        attempt,
                    });
                }
            }
        }
        result
    }

    /// Current state of a domain
    #[must_use]
    pub fn state(&self, key: &DomainKey) -> DataState<DomainData> {
        self.inner.store.state(key)
    }

    /// Drop the cached entry for `key`
    ///
    /// Committed state is kept; the next load or sweep refetches.
    pub fn invalidate(&self, key: &DomainKey) {
        self.inner.coordinator.cache().invalidate(key);
    }

    /// Drop every cached entry
    pub fn invalidate_all(&self) {
        self.inner.coordinator.cache().invalidate_all();
    }

    /// Receive error notices from now on
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<ErrorNotice> {
        self.inner.notices.subscribe()
    }

    /// Cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.inner.coordinator.cache();
        cache.sync();
        cache.stats()
    }

    /// Coordinator statistics
    #[must_use]
    pub fn coordinator_stats(&self) -> CoordinatorStats {
        self.inner.coordinator.stats()
    }

    /// Number of fetches currently outstanding
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.coordinator.in_flight_count()
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Run one staleness sweep immediately
    pub fn sweep_now(&self) -> usize {
        if self.is_disposed() {
            return 0;
        }
        self.staleness_monitor().sweep()
    }

    pub(crate) fn watch(&self, key: &DomainKey) -> watch::Receiver<Slot<DomainData>> {
        self.inner.store.subscribe(key)
    }

    pub(crate) fn status(&self, key: &DomainKey) -> Status {
        self.inner.store.status(key)
    }

    fn staleness_monitor(&self) -> StalenessMonitor<DomainData> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let refresh: RefreshFn = Arc::new(move |key| {
            if let Some(inner) = weak.upgrade() {
                let provider = SyncProvider { inner };
                if !provider.is_disposed() {
                    let _ = provider.spawn_load(key, false);
                }
            }
        });
        StalenessMonitor::new(
            Arc::clone(&self.inner.store),
            self.inner.coordinator.cache().clone(),
            self.inner.config.sweep_interval(),
            refresh,
        )
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
