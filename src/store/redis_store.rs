//! Redis Backend
//!
//! Backing store over a multiplexed tokio connection. Counting uses the
//! server's native `KEYS` pattern matching.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, IntoConnectionInfo};
use tracing::{debug, info};

use super::{with_deadline, Backend};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};

/// Redis-backed [`Backend`].
pub struct RedisBackend {
    /// Shared connection, cloned per call
    conn: MultiplexedConnection,
    /// Prefix prepended to every key
    namespace: String,
    /// Deadline for each command
    timeout: Duration,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to `config.host:config.port`, authenticating with `config.auth`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut info = format!("redis://{}:{}/", config.host, config.port)
            .into_connection_info()
            .map_err(|e| CacheError::InvalidConfiguration(format!("redis address: {}", e)))?;
        info.redis.password = config.auth.clone();

        let client = Client::open(info)
            .map_err(|e| CacheError::InvalidConfiguration(format!("redis client: {}", e)))?;
        let conn = with_deadline(
            config.operation_timeout,
            "redis CONNECT",
            client.get_multiplexed_async_connection(),
        )
        .await?;

        info!("Connected to redis at {}:{}", config.host, config.port);
        Ok(Self {
            conn,
            namespace: config.namespace.clone(),
            timeout: config.operation_timeout,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);
        with_deadline(self.timeout, "redis GET", conn.get::<_, Option<String>>(&key)).await
    }

    async fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(&key, value)
            .ignore()
            .pexpire_at(&key, expires_at.timestamp_millis())
            .ignore();
        with_deadline(self.timeout, "redis SET", pipe.query_async::<()>(&mut conn)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);
        let removed = with_deadline(self.timeout, "redis DEL", conn.del::<_, i64>(&key)).await?;
        debug!("redis DEL {} removed {}", key, removed);
        Ok(())
    }

    async fn count_matching(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let pattern = self.full_key(pattern);
        let keys =
            with_deadline(self.timeout, "redis KEYS", conn.keys::<_, Vec<String>>(&pattern)).await?;
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    // Needs a local redis-server; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_redis_roundtrip_and_count() {
        let mut config = StoreConfig::new(BackendKind::Redis, "127.0.0.1", 6379);
        config.namespace = "abtest_cache:unit:".to_string();
        let backend = RedisBackend::connect(&config).await.unwrap();
        let expires = Utc::now() + chrono::Duration::seconds(30);

        backend.set("t.node.a", "1", expires).await.unwrap();
        assert_eq!(backend.get("t.node.a").await.unwrap(), Some("1".to_string()));
        assert_eq!(backend.count_matching("t.node.*").await.unwrap(), 1);

        backend.delete("t.node.a").await.unwrap();
        backend.delete("t.node.a").await.unwrap();
        assert_eq!(backend.get("t.node.a").await.unwrap(), None);
    }
}
