//! Cancellation signal composition
//!
//! [`CombinedSignal`] owns a token that is cancelled when *any* linked source
//! is cancelled, or when the owner cancels it directly. Linked sources are
//! never cancelled by the combined token.
//!
//! ```text
//! caller signal ──┐
//!                 ├──► CombinedSignal.token() ──► task
//! task owner   ───┘          ▲
//!                            └── cancel() (deadline)
//! ```

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Any-of combinator over cancellation tokens
///
/// Cancelling is idempotent and safe after the task has completed. Dropping
/// the combinator detaches it from its sources: cancellations arriving later
/// no longer reach the combined token.
#[derive(Debug, Default)]
pub struct CombinedSignal {
    token: CancellationToken,
    watchers: Vec<JoinHandle<()>>,
}

impl CombinedSignal {
    /// Create with no linked sources
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine several sources
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn any_of<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = CancellationToken>,
    {
        let mut signal = Self::new();
        for source in sources {
            signal.link(source);
        }
        signal
    }

    /// Cancel the combined token whenever `source` is cancelled
    pub fn link(&mut self, source: CancellationToken) {
        if self.token.is_cancelled() {
            return;
        }
        if source.is_cancelled() {
            self.token.cancel();
            return;
        }

        let combined = self.token.clone();
        self.watchers.push(tokio::spawn(async move {
            tokio::select! {
                () = source.cancelled() => combined.cancel(),
                () = combined.cancelled() => {}
            }
        }));
    }

    /// Token to hand to the guarded task
    #[inline]
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the combined token
    #[inline]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check whether the combined token fired
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CombinedSignal {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}
