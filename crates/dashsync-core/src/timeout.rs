//! Deadline guard for collaborator calls
//!
//! Races a task against a timer. The task receives a token that fires on
//! deadline expiry or when any externally supplied signal fires; whichever
//! happens first settles the call.

use crate::signal::CombinedSignal;
use dashsync_model::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs one task under a deadline
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    label: String,
    timeout: Duration,
    signals: Vec<CancellationToken>,
}

impl TimeoutGuard {
    /// Create guard with a diagnostic label and a deadline
    #[must_use]
    pub fn new(label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            timeout,
            signals: Vec::new(),
        }
    }

    /// Also cancel the task when `signal` fires
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signals.push(signal);
        self
    }

    /// Run `task` to completion, deadline or cancellation.
    ///
    /// # Errors
    /// - the task's own error, unchanged
    /// - `FetchError::Timeout` if the deadline fired first (the task's token
    ///   is cancelled before returning)
    /// - `FetchError::Cancelled` if an external signal fired first
    pub async fn run<T, F, Fut>(self, task: F) -> Result<T, FetchError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let signal = CombinedSignal::any_of(self.signals);
        let token = signal.token();
        let work = task(signal.token());
        tokio::pin!(work);

        tokio::select! {
            biased;

            result = &mut work => result,

            () = tokio::time::sleep(self.timeout) => {
                signal.cancel();
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(label = %self.label, timeout_ms, "deadline exceeded, task cancelled");
                Err(FetchError::Timeout {
                    label: self.label,
                    timeout_ms,
                })
            }

            () = token.cancelled() => {
                debug!(label = %self.label, "task cancelled before completion");
                Err(FetchError::Cancelled(self.label))
            }
        }
    }
}

/// Run `task` under `timeout`, optionally also cancelled by `external`
///
/// # Errors
/// As [`TimeoutGuard::run`]
pub async fn with_deadline<T, F, Fut>(
    task: F,
    timeout: Duration,
    label: &str,
    external: Option<CancellationToken>,
) -> Result<T, FetchError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut guard = TimeoutGuard::new(label, timeout);
    if let Some(signal) = external {
        guard = guard.with_signal(signal);
    }
    guard.run(task).await
}

/// Check if a fetch error came from the deadline
#[inline]
#[must_use]
pub fn is_timeout_error(err: &FetchError) -> bool {
    err.is_timeout()
}
