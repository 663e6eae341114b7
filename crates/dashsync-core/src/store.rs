//! Per-domain state container
//!
//! Each domain moves through `idle → loading → {success, error}` and may
//! re-enter `loading` from any state. Transitions go through the pure reducer
//! [`apply`]; the [`StateStore`] adds attempt numbers so that only the most
//! recent attempt for a key can commit its outcome.

use dashmap::DashMap;
use dashsync_model::{DataFetchError, DataState, DomainKey, Status};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

/// State transition request
#[derive(Debug, Clone)]
pub enum Action<T> {
    /// A fetch began
    Started,
    /// A fetch produced data
    Succeeded(T),
    /// A fetch failed
    Failed(DataFetchError),
}

impl<T> Action<T> {
    /// Status the action leads to
    #[must_use]
    pub fn target(&self) -> Status {
        match self {
            Self::Started => Status::Loading,
            Self::Succeeded(_) => Status::Success,
            Self::Failed(_) => Status::Error,
        }
    }
}

/// Check whether `action` may be applied in status `from`
///
/// `Started` is accepted anywhere. Outcomes are accepted only while loading.
#[must_use]
pub fn allowed(from: Status, action: &Action<impl Sized>) -> bool {
    match action {
        Action::Started => true,
        Action::Succeeded(_) | Action::Failed(_) => from == Status::Loading,
    }
}

/// Reduce `prev` by `action` at time `now`
///
/// A disallowed transition leaves the state unchanged.
#[must_use]
pub fn apply_at<T: Clone>(prev: &DataState<T>, action: Action<T>, now: Instant) -> DataState<T> {
    if !allowed(prev.status(), &action) {
        return prev.clone();
    }
    match action {
        Action::Started => DataState::Loading { since: now },
        Action::Succeeded(data) => DataState::Success { data, at: now },
        Action::Failed(error) => DataState::Error { error, at: now },
    }
}

/// Reduce `prev` by `action`, stamped with the current time
#[must_use]
pub fn apply<T: Clone>(prev: &DataState<T>, action: Action<T>) -> DataState<T> {
    apply_at(prev, action, Instant::now())
}

/// One domain's published slot
#[derive(Debug, Clone)]
pub struct Slot<T> {
    /// Current state
    pub state: DataState<T>,
    /// Number of the most recent attempt, zero before the first
    pub attempt: u64,
    /// Successful commits so far
    pub successes: u64,
    /// Data from the most recent success, kept across later transitions
    pub last_data: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: DataState::Idle,
            attempt: 0,
            successes: 0,
            last_data: None,
        }
    }
}

/// Domain-keyed collection of watched slots
pub struct StateStore<T> {
    slots: DashMap<DomainKey, watch::Sender<Slot<T>>>,
}

impl<T> std::fmt::Debug for StateStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("domains", &self.slots.len())
            .finish()
    }
}

impl<T> Default for StateStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StateStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Copy of the slot for `key`
    #[must_use]
    pub fn snapshot(&self, key: &DomainKey) -> Slot<T> {
        self.slots
            .get(key)
            .map(|tx| tx.borrow().clone())
            .unwrap_or_default()
    }

    /// Current state of `key`
    #[must_use]
    pub fn state(&self, key: &DomainKey) -> DataState<T> {
        self.slots
            .get(key)
            .map(|tx| tx.borrow().state.clone())
            .unwrap_or_default()
    }

    /// Current status of `key`
    #[must_use]
    pub fn status(&self, key: &DomainKey) -> Status {
        self.slots
            .get(key)
            .map_or(Status::Idle, |tx| tx.borrow().state.status())
    }

    /// Watch the slot for `key`, creating it if absent
    #[must_use]
    pub fn subscribe(&self, key: &DomainKey) -> watch::Receiver<Slot<T>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| watch::Sender::new(Slot::default()))
            .subscribe()
    }

    /// Enter `loading` for `key` and return the new attempt number
    pub fn begin(&self, key: &DomainKey) -> u64 {
        let tx = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| watch::Sender::new(Slot::default()));
        let mut attempt = 0;
        tx.send_modify(|slot| {
            slot.attempt += 1;
            slot.state = apply(&slot.state, Action::Started);
            attempt = slot.attempt;
        });
        trace!(key = %key, attempt, "state loading");
        attempt
    }

    /// Apply `action` if `attempt` is still the latest for `key`
    ///
    /// Returns whether the slot changed.
    pub fn commit(&self, key: &DomainKey, attempt: u64, action: Action<T>) -> bool {
        let Some(tx) = self.slots.get(key) else {
            return false;
        };
        let target = action.target();
        let applied = tx.send_if_modified(|slot| {
            if slot.attempt != attempt || !allowed(slot.state.status(), &action) {
                return false;
            }
            if let Action::Succeeded(data) = &action {
                slot.last_data = Some(data.clone());
                slot.successes += 1;
            }
            slot.state = apply(&slot.state, action);
            true
        });
        if applied {
            trace!(key = %key, attempt, status = %target, "state committed");
        } else {
            trace!(key = %key, attempt, "stale commit ignored");
        }
        applied
    }

    /// Keys with a slot
    #[must_use]
    pub fn keys(&self) -> Vec<DomainKey> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Keys currently in `status`
    #[must_use]
    pub fn keys_with_status(&self, status: Status) -> Vec<DomainKey> {
        self.slots
            .iter()
            .filter(|entry| entry.value().borrow().state.status() == status)
            .map(|entry| entry.key().clone())
            .collect()
    }
}
