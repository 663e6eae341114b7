//! dashsync Core - synchronization coordinator
//!
//! Keeps the dashboard's domains (progress, manpower, AI insights, risk,
//! monthly index and snapshots) loaded and fresh:
//! - One outstanding fetch per domain; concurrent callers share it
//! - Forced refreshes supersede older fetches, whose results are discarded
//! - Every fetch runs under a deadline
//! - Successful results are cached with a TTL and swept when stale
//! - Consumers get a live, flag-annotated view of each domain
//!
//! # Example
//!
//! ```rust,ignore
//! use dashsync_core::prelude::*;
//!
//! # async fn example(fetcher: impl DomainFetcher) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = SyncProvider::create(SyncConfig::new(), fetcher)?;
//!
//! let mut progress = provider.subscribe(DomainKey::Progress, HookOptions::default());
//! while progress.changed().await {
//!     let view = progress.view();
//!     if !view.is_loading {
//!         println!("{} rows", view.data.map_or(0, |d| d.row_count()));
//!         break;
//!     }
//! }
//!
//! provider.dispose();
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hook;
pub mod monitor;
pub mod provider;
pub mod signal;
pub mod store;
pub mod timeout;

// Re-exports for convenience
pub use config::{SyncConfig, TimeoutBudgets};
pub use coordinator::{CoordinatorStats, FetchHandle, FetchOptions, RequestCoordinator};
pub use error::ConfigError;
pub use hook::{DomainSubscription, DomainView, HookOptions, RefetchOptions};
pub use monitor::{MonitorHandle, RefreshFn, StalenessMonitor};
pub use provider::{ErrorNotice, SyncProvider};
pub use signal::CombinedSignal;
pub use store::{apply, Action, Slot, StateStore};
pub use timeout::{is_timeout_error, with_deadline, TimeoutGuard};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with dashsync Core
    pub use crate::{
        DomainSubscription, DomainView, ErrorNotice, HookOptions, RefetchOptions, SyncConfig,
        SyncProvider,
    };
    pub use dashsync_model::{
        DataFetchError, DataState, DomainData, DomainFetcher, DomainKey, FetchError, Status,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
