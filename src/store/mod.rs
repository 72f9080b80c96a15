//! Backing Store Module
//!
//! Uniform interface over the key-value services that persist cache nodes.
//!
//! # Backends
//! - [`RedisBackend`] - native `KEYS` pattern enumeration (feature `redis`)
//! - [`MemcachedBackend`] - prefix match over a full key dump (feature `memcached`)
//! - [`MemoryBackend`] - in-process map with lazy expiry
//!
//! Every backend prepends its namespace to keys and patterns, applies the
//! configured deadline to each call and reports any failure as
//! [`CacheError::StoreUnavailable`]. Nothing is retried here.

mod memory;
#[cfg(feature = "memcached")]
mod memcached_store;
#[cfg(feature = "redis")]
mod redis_store;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{BackendKind, StoreConfig};
use crate::error::{CacheError, Result};

pub use memory::{MemoryBackend, StoredEntry};
#[cfg(feature = "memcached")]
pub use memcached_store::MemcachedBackend;
#[cfg(feature = "redis")]
pub use redis_store::RedisBackend;

// == Backend Trait ==
/// Operations the cache needs from a key-value service.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Returns the raw value, or `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites `key` and (re)applies the absolute expiry.
    async fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Counts live keys matching a glob `pattern` ending in `*`.
    async fn count_matching(&self, pattern: &str) -> Result<usize>;
}

// == Connect ==
/// Builds the backend selected by `config.kind`.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn Backend>> {
    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::with_namespace(&config.namespace))),
        #[cfg(feature = "redis")]
        BackendKind::Redis => Ok(Arc::new(RedisBackend::connect(config).await?)),
        #[cfg(feature = "memcached")]
        BackendKind::Memcached => Ok(Arc::new(MemcachedBackend::connect(config).await?)),
        #[allow(unreachable_patterns)]
        other => Err(CacheError::InvalidConfiguration(format!(
            "backend '{}' is not compiled into this build",
            other
        ))),
    }
}

// == Helpers ==
/// Text a key must start with to match `pattern`.
///
/// Patterns are globs whose only wildcard is a trailing `*`.
pub fn pattern_prefix(pattern: &str) -> &str {
    pattern.strip_suffix('*').unwrap_or(pattern)
}

/// Runs a backend call under `limit`, mapping both its error and a timeout
/// to [`CacheError::StoreUnavailable`].
pub(crate) async fn with_deadline<T, E, F>(limit: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CacheError::StoreUnavailable(format!("{} failed: {}", op, e))),
        Err(_) => Err(CacheError::StoreUnavailable(format!(
            "{} timed out after {}ms",
            op,
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_prefix() {
        assert_eq!(pattern_prefix("experiment.node.*"), "experiment.node.");
        assert_eq!(pattern_prefix("exact"), "exact");
    }

    #[tokio::test]
    async fn test_with_deadline_maps_timeout() {
        let result: Result<()> = with_deadline(Duration::from_millis(10), "GET", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<(), std::io::Error>(())
        })
        .await;
        assert!(matches!(result, Err(CacheError::StoreUnavailable(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_with_deadline_maps_error() {
        let result: Result<()> = with_deadline(Duration::from_secs(1), "DEL", async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"))
        })
        .await;
        assert!(matches!(result, Err(CacheError::StoreUnavailable(msg)) if msg.contains("DEL")));
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let backend = connect(&StoreConfig::memory()).await.unwrap();
        assert_eq!(backend.count_matching("*").await.unwrap(), 0);
    }
}
