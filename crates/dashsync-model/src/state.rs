//! Per-domain fetch state
//!
//! [`DataState`] is an enum so that "data present iff success" and "error
//! present iff error" hold by construction.

use crate::error::DataFetchError;
use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle status of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    /// Never requested
    Idle,
    /// Fetch outstanding
    Loading,
    /// Last fetch succeeded
    Success,
    /// Last fetch failed
    Error,
}

impl Status {
    /// Lower-case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Loading => "loading",
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one domain
#[derive(Debug, Clone)]
pub enum DataState<T> {
    /// Never requested
    Idle,
    /// Fetch outstanding since `since`
    Loading { since: Instant },
    /// Data committed at `at`
    Success { data: T, at: Instant },
    /// Failure committed at `at`
    Error { error: DataFetchError, at: Instant },
}

impl<T> Default for DataState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> DataState<T> {
    /// Current status
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Idle => Status::Idle,
            Self::Loading { .. } => Status::Loading,
            Self::Success { .. } => Status::Success,
            Self::Error { .. } => Status::Error,
        }
    }

    /// Data, present only on success
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Error, present only on failure
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&DataFetchError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Time of the last transition, absent while idle
    #[must_use]
    pub fn timestamp(&self) -> Option<Instant> {
        match self {
            Self::Idle => None,
            Self::Loading { since } => Some(*since),
            Self::Success { at, .. } | Self::Error { at, .. } => Some(*at),
        }
    }

    /// Check if idle
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if loading
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Check if success
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Check if error
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
