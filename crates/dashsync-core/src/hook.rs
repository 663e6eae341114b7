//! Consumer-facing domain subscriptions

use crate::provider::SyncProvider;
use crate::store::Slot;
use dashsync_model::{DataFetchError, DomainData, DomainKey, Status};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Subscription options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookOptions {
    /// Start a fetch when subscribing to an idle domain
    pub auto_fetch: bool,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self { auto_fetch: true }
    }
}

impl HookOptions {
    /// Subscribe without fetching
    #[must_use]
    pub fn passive() -> Self {
        Self { auto_fetch: false }
    }
}

/// Manual refetch options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchOptions {
    /// Bypass the cache and supersede any in-flight fetch
    pub force_refresh: bool,
}

impl Default for RefetchOptions {
    fn default() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// What a renderer needs to draw one domain
#[derive(Debug, Clone)]
pub struct DomainView {
    /// Lifecycle status
    pub status: Status,
    /// Committed data, or the previous data while refreshing
    pub data: Option<DomainData>,
    /// Committed error
    pub error: Option<DataFetchError>,
    /// A fetch is outstanding
    pub is_loading: bool,
    /// Loading with earlier data available
    pub is_refreshing: bool,
    /// Loading with nothing to show yet
    pub is_initial_loading: bool,
    /// Time of the last transition
    pub updated_at: Option<Instant>,
}

impl DomainView {
    fn from_slot(slot: &Slot<DomainData>) -> Self {
        let status = slot.state.status();
        let is_loading = status == Status::Loading;
        let seen_success = slot.successes > 0;
        let data = match slot.state.data() {
            Some(data) => Some(data.clone()),
            None if is_loading => slot.last_data.clone(),
            None => None,
        };
        Self {
            status,
            data,
            error: slot.state.error().cloned(),
            is_loading,
            is_refreshing: is_loading && seen_success,
            is_initial_loading: is_loading && !seen_success,
            updated_at: slot.state.timestamp(),
        }
    }
}

/// Live view of one domain
///
/// Dropping or [unsubscribing](DomainSubscription::unsubscribe) makes the
/// subscription inert.
pub struct DomainSubscription {
    provider: SyncProvider,
    key: DomainKey,
    rx: watch::Receiver<Slot<DomainData>>,
    throttle: Duration,
    last_refetch: Mutex<Option<Instant>>,
    active: AtomicBool,
}

impl std::fmt::Debug for DomainSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainSubscription")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl DomainSubscription {
    pub(crate) fn new(provider: SyncProvider, key: DomainKey, options: HookOptions) -> Self {
        let rx = provider.watch(&key);
        let throttle = provider.config().refetch_throttle();

        if options.auto_fetch && provider.status(&key) == Status::Idle {
            debug!(key = %key, "auto-fetching idle domain");
            let _ = provider.spawn_load(key.clone(), false);
        }

        Self {
            provider,
            key,
            rx,
            throttle,
            last_refetch: Mutex::new(None),
            active: AtomicBool::new(true),
        }
    }

    /// Subscribed domain
    #[inline]
    #[must_use]
    pub fn key(&self) -> &DomainKey {
        &self.key
    }

    /// Current view
    #[must_use]
    pub fn view(&self) -> DomainView {
        DomainView::from_slot(&self.rx.borrow())
    }

    /// Wait for the next state change
    ///
    /// Returns `false` once the subscription is inactive or the provider is
    /// gone.
    pub async fn changed(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.rx.changed().await.is_ok()
    }

    /// Refetch the domain
    ///
    /// Returns `None` without doing anything when the subscription is
    /// inactive or the previous accepted call was less than the throttle
    /// window ago.
    pub async fn refetch(
        &self,
        options: RefetchOptions,
    ) -> Option<Result<DomainData, DataFetchError>> {
        if !self.is_active() {
            return None;
        }
        {
            let now = Instant::now();
            let mut last = self.last_refetch.lock();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.throttle {
                    debug!(key = %self.key, "refetch throttled");
                    return None;
                }
            }
            *last = Some(now);
        }
        Some(self.provider.load(&self.key, options.force_refresh).await)
    }

    /// Stop reacting to this subscription
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Check whether the subscription is live
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for DomainSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
