//! dashsync Model
//!
//! Vocabulary shared by every dashsync crate.
//!
//! # Core Concepts
//!
//! - [`DomainKey`]: which data set (`progress`, `monthlySnapshot:2025-09`, ...)
//! - [`DataState<T>`]: `idle → loading → {success, error}` per domain
//! - [`FetchError`] / [`DataFetchError`]: raw and classified failures
//! - [`DomainData`]: decoded payloads
//! - [`DomainFetcher`]: the upstream collaborator contract
//!
//! # Example
//!
//! ```rust
//! use dashsync_model::{DataFetchError, DomainKey, FetchError};
//!
//! let key: DomainKey = "monthlySnapshot:2025-09".parse().unwrap();
//! let err = DataFetchError::classify(&key, &FetchError::not_found("no such month"));
//! assert!(!err.retryable);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod error;
mod fetcher;
mod key;
mod payload;
mod state;

// Re-exports
pub use error::{DataFetchError, FetchError, FetchErrorKind};
pub use fetcher::DomainFetcher;
pub use key::{DomainKey, KeyError, YearMonth};
pub use payload::{DomainData, MonthlyIndex, MonthlySnapshot, Row, Snapshot, SnapshotSummary};
pub use state::{DataState, Status};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
