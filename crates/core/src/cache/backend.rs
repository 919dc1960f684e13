//! Key/value backends behind the cache-aside layer.
//!
//! Backends return errors honestly; swallowing them is the job of
//! [`SnippetCache`](super::SnippetCache).

use std::time::Duration;

use async_trait::async_trait;

use crate::Error;

/// String-valued store with per-key TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// `None` when the key is absent or has expired.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Round trip used once at startup to decide whether caching is enabled.
    async fn ping(&self) -> Result<(), Error>;
}
