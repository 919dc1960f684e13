//! Best-effort cache-aside layer for snippet rows.
//!
//! This module wraps a key/value backend (Redis or SQLite) behind a layer
//! that never fails its caller:
//!
//! - `get` reports a miss on any backend error, timeout, or undecodable
//!   value, and deletes undecodable values so they are not retried
//! - `set` and `delete` have no error channel; failures are logged
//! - a disabled cache (by configuration or because the backend was
//!   unreachable at startup) turns every call into a no-op
//!
//! Entries are populated only by read misses and are deleted, never
//! refreshed, by writes.

pub mod backend;
pub mod key;
pub mod redis_backend;
pub mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::config::{CacheBackendKind, CacheConfig};

pub use backend::CacheBackend;
pub use key::snippet_key;
pub use redis_backend::RedisCacheBackend;
pub use sqlite::SqliteCacheBackend;

/// Cache-aside handle. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SnippetCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
    timeout: Duration,
}

impl SnippetCache {
    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { backend: None, ttl: Duration::ZERO, timeout: Duration::ZERO }
    }

    /// Wrap an already-connected backend.
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, timeout: Duration) -> Self {
        Self { backend: Some(backend), ttl, timeout }
    }

    /// Build the configured backend and ping it.
    ///
    /// Never fails: a disabled flag, an unreachable backend, or a failed
    /// ping all yield a disabled cache, with the reason logged.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled {
            tracing::info!("cache disabled by configuration");
            return Self::disabled();
        }

        let timeout = config.timeout();
        let connected = tokio::time::timeout(timeout, async {
            let backend: Arc<dyn CacheBackend> = match config.backend {
                CacheBackendKind::Redis => Arc::new(RedisCacheBackend::connect(&config.redis_url()).await?) as _,
                CacheBackendKind::Sqlite => Arc::new(SqliteCacheBackend::open(&config.path).await?) as _,
            };
            backend.ping().await?;
            Ok::<_, crate::Error>(backend)
        })
        .await;

        match connected {
            Ok(Ok(backend)) => {
                tracing::info!(backend = ?config.backend, ttl_secs = config.ttl_secs, "cache connected");
                Self::new(backend, config.ttl(), timeout)
            }
            Ok(Err(e)) => {
                tracing::error!(backend = ?config.backend, error = %e, "cache connection failed; caching disabled");
                Self::disabled()
            }
            Err(_) => {
                tracing::error!(backend = ?config.backend, ?timeout, "cache connection timed out; caching disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Bound a backend call by the cache deadline. `None` means it failed or
    /// timed out, and has already been logged.
    async fn guarded<T>(&self, op: &str, key: &str, fut: impl Future<Output = Result<T, crate::Error>>) -> Option<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(op, key, error = %e, "cache operation failed");
                None
            }
            Err(_) => {
                tracing::warn!(op, key, timeout = ?self.timeout, "cache operation timed out");
                None
            }
        }
    }

    /// Look up `key` and decode it as `T`.
    ///
    /// A stored value that does not decode is deleted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let raw = self.guarded("get", key, backend.get_raw(key)).await.flatten()?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                self.guarded("delete", key, backend.delete(key)).await;
                None
            }
        }
    }

    /// Store `value` under `key` with the configured TTL. Fire-and-forget.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode value for cache");
                return;
            }
        };
        self.guarded("set", key, backend.set_raw(key, &raw, self.ttl)).await;
    }

    /// Remove `key`. Fire-and-forget.
    pub async fn delete(&self, key: &str) {
        if let Some(backend) = self.backend.as_ref() {
            self.guarded("delete", key, backend.delete(key)).await;
        }
    }
}
