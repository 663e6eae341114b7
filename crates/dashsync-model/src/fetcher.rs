//! Upstream collaborator contract

use crate::error::FetchError;
use crate::key::DomainKey;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Performs the actual read for a domain (spreadsheet query, insight
/// generation, monthly index or snapshot lookup).
///
/// Implementations should stop work promptly once `signal` is cancelled; the
/// coordinator discards any result produced afterwards.
#[async_trait]
pub trait DomainFetcher: Send + Sync + 'static {
    /// Fetch the raw JSON payload for `key`
    async fn fetch(&self, key: &DomainKey, signal: CancellationToken) -> Result<Value, FetchError>;
}

#[async_trait]
impl<F: DomainFetcher + ?Sized> DomainFetcher for Arc<F> {
    async fn fetch(&self, key: &DomainKey, signal: CancellationToken) -> Result<Value, FetchError> {
        (**self).fetch(key, signal).await
    }
}
