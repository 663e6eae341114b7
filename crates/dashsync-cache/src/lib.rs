//! dashsync Cache Layer
//!
//! Keyed store of `{data, timestamp, ttl}` entries for the synchronization
//! coordinator.
//!
//! # Architecture
//!
//! ```text
//! RequestCoordinator ──get──► CacheLayer ──► CacheEntry { data, timestamp, ttl }
//!          │                                      │
//!          └──────────── set (on success) ◄───────┘   is_stale: age >= ttl
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod cache;

// Re-exports for convenience
pub use cache::{CacheEntry, CacheLayer, CacheStats, DEFAULT_CAPACITY, DEFAULT_TTL};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
