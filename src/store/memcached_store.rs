//! Memcached Backend
//!
//! Memcached cannot match keys by pattern, so counting walks the full key
//! listing (`lru_crawler metadump all`) and matches the prefix client-side.
//! The client needs `&mut self`, hence the mutex around it.

use std::fmt;
use std::time::Duration;

use async_memcached::{Client, Error as MemcachedError, Status};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{pattern_prefix, with_deadline, Backend};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};

/// Memcached-backed [`Backend`].
pub struct MemcachedBackend {
    client: Mutex<Client>,
    namespace: String,
    timeout: Duration,
}

impl fmt::Debug for MemcachedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemcachedBackend")
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MemcachedBackend {
    /// Connects to `config.host:config.port`. `config.auth` is not used.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        if config.auth.is_some() {
            warn!("memcached backend ignores the configured auth credential");
        }
        let dsn = format!("tcp://{}:{}", config.host, config.port);
        let client = with_deadline(config.operation_timeout, "memcached CONNECT", Client::new(&dsn))
            .await?;

        info!("Connected to memcached at {}:{}", config.host, config.port);
        Ok(Self {
            client: Mutex::new(client),
            namespace: config.namespace.clone(),
            timeout: config.operation_timeout,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl Backend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = self.full_key(key);
        let mut client = self.client.lock().await;
        let value = with_deadline(self.timeout, "memcached get", client.get(&key)).await?;

        match value.and_then(|v| v.data) {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| CacheError::StoreUnavailable(format!("memcached value for {}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let key = self.full_key(key);
        let mut client = self.client.lock().await;
        // Memcached reads expirations above 30 days as absolute unix time.
        with_deadline(
            self.timeout,
            "memcached set",
            client.set(&key, value, Some(expires_at.timestamp()), None),
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = self.full_key(key);
        let mut client = self.client.lock().await;
        let result = tokio::time::timeout(self.timeout, client.delete(&key))
            .await
            .map_err(|_| CacheError::store(format!("memcached delete timed out for {}", key)))?;

        match result {
            Ok(()) => Ok(()),
            Err(MemcachedError::Protocol(Status::NotFound)) => {
                debug!("memcached delete of absent key {}", key);
                Ok(())
            }
            Err(e) => Err(CacheError::store(format!("memcached delete failed: {}", e))),
        }
    }

    async fn count_matching(&self, pattern: &str) -> Result<usize> {
        let prefix = self.full_key(pattern_prefix(pattern));
        let now = Utc::now().timestamp();
        let mut client = self.client.lock().await;

        let count = tokio::time::timeout(self.timeout, async {
            let mut dump = client.dump_keys().await?;
            let mut count = 0usize;
            while let Some(meta) = dump.next().await {
                let meta = meta?;
                let live = meta.expiration <= 0 || meta.expiration > now;
                if live && meta.key.starts_with(prefix.as_bytes()) {
                    count += 1;
                }
            }
            Ok::<usize, MemcachedError>(count)
        })
        .await
        .map_err(|_| CacheError::store("memcached key dump timed out"))?
        .map_err(|e| CacheError::store(format!("memcached key dump failed: {}", e)))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    // Needs a local memcached; run with `cargo test --features memcached -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_memcached_roundtrip_and_count() {
        let mut config = StoreConfig::new(BackendKind::Memcached, "127.0.0.1", 11211);
        config.namespace = "abtest_cache:unit:".to_string();
        let backend = MemcachedBackend::connect(&config).await.unwrap();
        let expires = Utc::now() + chrono::Duration::seconds(30);

        backend.set("t.node.a", "1", expires).await.unwrap();
        assert_eq!(backend.get("t.node.a").await.unwrap(), Some("1".to_string()));
        assert_eq!(backend.count_matching("t.node.*").await.unwrap(), 1);

        backend.delete("t.node.a").await.unwrap();
        backend.delete("t.node.a").await.unwrap();
        assert_eq!(backend.get("t.node.a").await.unwrap(), None);
    }
}
