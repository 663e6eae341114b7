//! Error types for data fetching
//!
//! Two layers:
//! - [`FetchError`]: what a collaborator (or the deadline guard) raises
//! - [`DataFetchError`]: the classified, cloneable form stored in state and
//!   handed to consumers, carrying the `retryable` decision

use crate::key::DomainKey;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw failure of a single fetch attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Upstream answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Deadline elapsed before the task settled
    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },

    /// Payload did not have the expected shape
    #[error("could not decode payload: {0}")]
    Parse(String),

    /// Task was cancelled by a superseding request or its caller
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Create HTTP error without a machine code
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Create HTTP 404 error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, message)
    }

    /// Attach a machine-readable code to an HTTP error
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        match self {
            Self::Http {
                status, message, ..
            } => Self::Http {
                status,
                code: Some(code.into()),
                message,
            },
            other => other,
        }
    }

    /// Check if error is a deadline timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if error is a cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Classification of a [`DataFetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchErrorKind {
    /// Deadline exceeded
    Timeout,
    /// Non-success upstream status
    Http,
    /// Payload shape mismatch
    Parse,
    /// Superseded or cancelled
    Cancelled,
    /// Unclassified
    Unknown,
}

/// Classified fetch failure as seen by state and consumers
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct DataFetchError {
    /// Classification
    pub kind: FetchErrorKind,
    /// Human-readable message
    pub message: String,
    /// Transport status, for HTTP failures
    pub status: Option<u16>,
    /// Optional machine code from upstream
    pub code: Option<String>,
    /// When the failure was classified
    pub timestamp: DateTime<Utc>,
    /// Whether retrying with the same input may succeed
    pub retryable: bool,
}

impl DataFetchError {
    /// Classify a raw failure for the given domain.
    ///
    /// 404 is permanent for every domain; 400 is permanent for AI insights
    /// only. Parse failures are permanent. Everything else is retryable.
    #[must_use]
    pub fn classify(key: &DomainKey, err: &FetchError) -> Self {
        match err {
            FetchError::Http {
                status,
                code,
                message,
            } => {
                let permanent =
                    *status == 404 || (*status == 400 && matches!(key, DomainKey::AiInsights));
                Self {
                    kind: FetchErrorKind::Http,
                    message: message.clone(),
                    status: Some(*status),
                    code: code.clone(),
                    timestamp: Utc::now(),
                    retryable: !permanent,
                }
            }
            FetchError::Timeout { .. } => Self::new(FetchErrorKind::Timeout, err.to_string(), true),
            FetchError::Parse(_) => Self::new(FetchErrorKind::Parse, err.to_string(), false),
            FetchError::Cancelled(_) => {
                Self::new(FetchErrorKind::Cancelled, err.to_string(), true)
            }
            FetchError::Other(message) => Self::new(
                FetchErrorKind::Unknown,
                format!("unexpected error fetching {key}: {message}"),
                true,
            ),
        }
    }

    /// Cancellation error for a key
    #[must_use]
    pub fn cancelled(key: &DomainKey, reason: &str) -> Self {
        Self::new(
            FetchErrorKind::Cancelled,
            format!("fetch for {key} cancelled: {reason}"),
            true,
        )
    }

    fn new(kind: FetchErrorKind, message: String, retryable: bool) -> Self {
        Self {
            kind,
            message,
            status: None,
            code: None,
            timestamp: Utc::now(),
            retryable,
        }
    }

    /// Check if error is a deadline timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == FetchErrorKind::Timeout
    }

    /// Check if error is a cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == FetchErrorKind::Cancelled
    }

    /// Check if upstream reported the resource as absent
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}
