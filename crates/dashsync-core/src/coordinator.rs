//! Request coordination for domain fetches.
//!
//! Guarantees at most one outstanding collaborator call per key. Concurrent
//! callers for the same key attach to the task already in flight; a forced
//! refresh cancels the current task and replaces it.
//!
//! # Architecture
//!
//! ```text
//! caller A ─┐                                  TimeoutGuard
//! caller B ─┼──► RequestCoordinator ──spawn──► collaborator
//! caller C ─┘       │        ▲                     │
//!                   │        └── settle(gen) ◄─────┘
//!                   ▼                 │
//!              CacheLayer ◄── write ──┘ (owner only)
//! ```
//!
//! # Ownership
//!
//! Every task gets a generation number from a monotonically increasing
//! counter. The in-flight registry stores the generation next to the task's
//! cancellation token and its shared handle. When a task settles it commits
//! (removes its registry entry and writes the cache) only if the registry
//! still holds its generation. A superseded task's callers receive a
//! cancellation error and nothing is written.
//!
//! Tasks are spawned, so settlement and cleanup run even if every caller
//! stops waiting.

use crate::timeout::TimeoutGuard;
use dashsync_cache::CacheLayer;
use dashsync_model::{DataFetchError, DomainKey, FetchError};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Awaitable, cloneable outcome of a registered fetch
pub type FetchHandle<T> = Shared<BoxFuture<'static, Result<T, DataFetchError>>>;

/// Per-call options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Bypass the cache and supersede any in-flight task
    pub force_refresh: bool,
    /// Caller-owned cancellation, OR-composed with the task's own
    pub external_signal: Option<CancellationToken>,
    /// Deadline for the collaborator call
    pub timeout: Duration,
    /// Lifetime of the cache entry written on success
    pub ttl: Duration,
}

impl FetchOptions {
    /// Create options with deadline and cache lifetime
    #[inline]
    #[must_use]
    pub fn new(timeout: Duration, ttl: Duration) -> Self {
        Self {
            force_refresh: false,
            external_signal: None,
            timeout,
            ttl,
        }
    }

    /// Force a refresh
    #[inline]
    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// With force flag
    #[inline]
    #[must_use]
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// With caller-owned cancellation
    #[inline]
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.external_signal = Some(signal);
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
            Duration::from_millis(crate::config::DEFAULT_TTL_MS),
        )
    }
}

/// Coordinator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Collaborator calls started
    pub started: u64,
    /// Callers attached to an in-flight task
    pub coalesced: u64,
    /// Calls answered from a fresh cache entry
    pub cache_hits: u64,
    /// Tasks cancelled by a forced refresh or explicit cancel
    pub superseded: u64,
    /// Tasks that settled with an error while owning their key
    pub failed: u64,
}

struct InFlight<T: Clone> {
    generation: u64,
    cancel: CancellationToken,
    task: FetchHandle<T>,
}

struct Inner<T: Clone> {
    cache: CacheLayer<T>,
    in_flight: Mutex<HashMap<DomainKey, InFlight<T>>>,
    next_generation: AtomicU64,
    stats: Mutex<CoordinatorStats>,
}

/// Per-key in-flight registry in front of a [`CacheLayer`]
pub struct RequestCoordinator<T: Clone> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone> Clone for RequestCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> std::fmt::Debug for RequestCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("in_flight", &self.inner.in_flight.lock().len())
            .field("stats", &*self.inner.stats.lock())
            .finish_non_exhaustive()
    }
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create coordinator over a cache
    #[must_use]
    pub fn new(cache: CacheLayer<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                stats: Mutex::new(CoordinatorStats::default()),
            }),
        }
    }

    /// Fetch `key` at most once at a time.
    ///
    /// 1. Unless forced, a fresh cache entry answers immediately.
    /// 2. Unless forced, an in-flight task for `key` is joined.
    /// 3. If forced, the in-flight task (if any) is cancelled and replaced.
    /// 4. Otherwise a new task runs `factory` under the deadline guard.
    ///
    /// # Errors
    /// The classified failure of the task this call ended up waiting on. A
    /// task that lost ownership of its key yields a cancellation error.
    pub async fn fetch_once<F, Fut>(
        &self,
        key: &DomainKey,
        factory: F,
        options: FetchOptions,
    ) -> Result<T, DataFetchError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.request(key, factory, options).await
    }

    /// Register interest in `key` without waiting.
    ///
    /// Same decisions as [`RequestCoordinator::fetch_once`], taken
    /// synchronously: when this returns, the task (if any) is already in the
    /// registry. The returned handle can be awaited by any number of callers.
    pub fn request<F, Fut>(&self, key: &DomainKey, factory: F, options: FetchOptions) -> FetchHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if !options.force_refresh {
            if let Some(data) = self.inner.cache.get_fresh(key) {
                self.inner.stats.lock().cache_hits += 1;
                debug!(key = %key, "served from cache");
                return futures::future::ready(Ok(data)).boxed().shared();
            }
        }

        let mut in_flight = self.inner.in_flight.lock();

        match in_flight.get(key) {
            Some(existing) if !options.force_refresh => {
                self.inner.stats.lock().coalesced += 1;
                debug!(
                    key = %key,
                    generation = existing.generation,
                    "joining in-flight fetch"
                );
                existing.task.clone()
            }
            _ => {
                if let Some(previous) = in_flight.remove(key) {
                    previous.cancel.cancel();
                    self.inner.stats.lock().superseded += 1;
                    info!(
                        key = %key,
                        generation = previous.generation,
                        "superseding in-flight fetch"
                    );
                }

                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                let task = self.start(key.clone(), generation, cancel.clone(), factory, options);
                in_flight.insert(
                    key.clone(),
                    InFlight {
                        generation,
                        cancel,
                        task: task.clone(),
                    },
                );
                self.inner.stats.lock().started += 1;
                debug!(key = %key, generation, "fetch started");
                task
            }
        }
    }

    fn start<F, Fut>(
        &self,
        key: DomainKey,
        generation: u64,
        cancel: CancellationToken,
        factory: F,
        options: FetchOptions,
    ) -> FetchHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let mut guard = TimeoutGuard::new(key.to_string(), options.timeout).with_signal(cancel);
            if let Some(external) = options.external_signal {
                guard = guard.with_signal(external);
            }
            let outcome = guard.run(factory).await;
            inner.settle(&key, generation, outcome, options.ttl)
        });

        async move {
            handle.await.unwrap_or_else(|join_error| {
                Err(DataFetchError::classify(
                    &task_key,
                    &FetchError::Other(format!("fetch task aborted: {join_error}")),
                ))
            })
        }
        .boxed()
        .shared()
    }

    /// Cancel the in-flight task for `key`, if any
    ///
    /// Returns whether a task was cancelled.
    pub fn cancel(&self, key: &DomainKey) -> bool {
        let removed = self.inner.in_flight.lock().remove(key);
        match removed {
            Some(previous) => {
                previous.cancel.cancel();
                self.inner.stats.lock().superseded += 1;
                debug!(key = %key, generation = previous.generation, "fetch cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight task
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.inner.in_flight.lock().drain().collect();
        for (_, previous) in &drained {
            previous.cancel.cancel();
        }
        self.inner.stats.lock().superseded += drained.len() as u64;
        drained.len()
    }

    /// Check whether a task is outstanding for `key`
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self, key: &DomainKey) -> bool {
        self.inner.in_flight.lock().contains_key(key)
    }

    /// Number of outstanding tasks
    #[inline]
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// The cache this coordinator writes through to
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &CacheLayer<T> {
        &self.inner.cache
    }

    /// Snapshot of the statistics
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        *self.inner.stats.lock()
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn settle(
        &self,
        key: &DomainKey,
        generation: u64,
        outcome: Result<T, FetchError>,
        ttl: Duration,
    ) -> Result<T, DataFetchError> {
        let mut in_flight = self.in_flight.lock();
        let owner = in_flight
            .get(key)
            .is_some_and(|entry| entry.generation == generation);

        if !owner {
            debug!(key = %key, generation, "discarding result of superseded fetch");
            return Err(DataFetchError::cancelled(key, "superseded"));
        }

        in_flight.remove(key);
        match outcome {
            Ok(data) => {
                self.cache.set(key.clone(), data.clone(), ttl);
                debug!(key = %key, generation, "fetch committed");
                Ok(data)
            }
            Err(err) => {
                let classified = DataFetchError::classify(key, &err);
                self.stats.lock().failed += 1;
                warn!(
                    key = %key,
                    generation,
                    kind = ?classified.kind,
                    status = ?classified.status,
                    retryable = classified.retryable,
                    "fetch failed: {}",
                    classified.message
                );
                Err(classified)
            }
        }
    }
}
