//! Domain cache using moka
//!
//! Entries carry their own `{timestamp, ttl}`. The layer never expires
//! anything on its own: [`CacheEntry::is_stale`] reports staleness and the
//! coordinator decides what to do with a stale entry.

use dashsync_model::DomainKey;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default time-to-live (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Default capacity bound
///
/// The key space is the fixed domains plus one key per month, so this is
/// only a backstop.
pub const DEFAULT_CAPACITY: u64 = 1_024;

/// Cached value with its write time and lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Cached data
    pub data: T,
    /// When the entry was written
    pub timestamp: Instant,
    /// How long the entry stays usable
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Create entry stamped now
    #[inline]
    #[must_use]
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
            ttl,
        }
    }

    /// Time since the entry was written
    #[inline]
    #[must_use]
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// `age >= ttl`
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.age() >= self.ttl
    }
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
    /// Reads that found a fresh entry
    pub fresh_hits: u64,
    /// Reads that found a stale entry
    pub stale_hits: u64,
    /// Reads that found nothing
    pub misses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fresh_hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
}

/// Keyed store of TTL-tagged entries
#[derive(Clone)]
pub struct CacheLayer<T> {
    inner: Cache<DomainKey, CacheEntry<T>>,
    counters: Arc<Counters>,
}

impl<T> std::fmt::Debug for CacheLayer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("entry_count", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}

impl<T> CacheLayer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Look up an entry, fresh or stale
    #[must_use]
    pub fn get(&self, key: &DomainKey) -> Option<CacheEntry<T>> {
        let entry = self.inner.get(key);
        let counter = match &entry {
            Some(e) if e.is_stale() => &self.counters.stale_hits,
            Some(_) => &self.counters.fresh_hits,
            None => &self.counters.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Look up an entry without touching the hit counters
    #[inline]
    #[must_use]
    pub fn peek(&self, key: &DomainKey) -> Option<CacheEntry<T>> {
        self.inner.get(key)
    }

    /// Look up an entry and return its data only while fresh
    #[must_use]
    pub fn get_fresh(&self, key: &DomainKey) -> Option<T> {
        self.get(key)
            .filter(|entry| !entry.is_stale())
            .map(|entry| entry.data)
    }

    /// Store data under `key`, stamped now
    pub fn set(&self, key: DomainKey, data: T, ttl: Duration) {
        tracing::trace!(key = %key, ttl_ms = ttl.as_millis(), "cache write");
        self.inner.insert(key, CacheEntry::new(data, ttl));
    }

    /// Staleness predicate
    #[inline]
    #[must_use]
    pub fn is_stale(entry: &CacheEntry<T>) -> bool {
        entry.is_stale()
    }

    /// Invalidate cache entry
    #[inline]
    pub fn invalidate(&self, key: &DomainKey) {
        self.inner.invalidate(key);
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Check if cache holds an entry (fresh or stale) for key
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &DomainKey) -> bool {
        self.inner.contains_key(key)
    }

    /// Flush moka's pending maintenance so counts are exact
    pub fn sync(&self) {
        self.inner.run_pending_tasks();
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            fresh_hits: self.counters.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.counters.stale_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for CacheLayer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
