//! In-Memory Backend
//!
//! HashMap storage with per-entry absolute expiry, behaving like a tiny
//! single-process Redis: expired entries are invisible to every read and are
//! physically dropped lazily or by [`MemoryBackend::purge_expired`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{pattern_prefix, Backend};
use crate::error::Result;

// == Stored Entry ==
/// A single stored value with its expiry.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// The stored value
    pub value: String,
    /// When the entry was last written
    pub written_at: DateTime<Utc>,
    /// Absolute expiration time
    pub expires_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Creates an entry expiring at `expires_at`.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            written_at: Utc::now(),
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches the expiration
    /// time, so a deadline of "now" is already expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining time to live in milliseconds, zero once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        (self.expires_at - Utc::now()).num_milliseconds().max(0) as u64
    }
}

// == Memory Backend ==
/// In-process implementation of [`Backend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Prefix prepended to every key
    namespace: String,
    /// Key-value storage, keyed by namespaced key
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty backend without a namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend prefixing every key with `namespace`.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    // == Purge Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    // == Length ==
    /// Number of physically held entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    // == Is Empty ==
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns the entry stored under `key` (namespace applied), even if expired.
    pub async fn entry(&self, key: &str) -> Option<StoredEntry> {
        self.entries.read().await.get(&self.full_key(key)).cloned()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let full_key = self.full_key(key);
        {
            let entries = self.entries.read().await;
            match entries.get(&full_key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it so it stops taking memory
        let mut entries = self.entries.write().await;
        if entries.get(&full_key).is_some_and(StoredEntry::is_expired) {
            entries.remove(&full_key);
            debug!("memory backend dropped expired key {}", full_key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let entry = StoredEntry::new(value, expires_at);
        self.entries.write().await.insert(self.full_key(key), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(&self.full_key(key));
        Ok(())
    }

    async fn count_matching(&self, pattern: &str) -> Result<usize> {
        let prefix = self.full_key(pattern_prefix(pattern));
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(&prefix) && !entry.is_expired_at(now))
            .count())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn in_secs(secs: i64) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(secs)
    }

    #[test]
    fn test_entry_expiration_boundary() {
        let now = Utc::now();
        let entry = StoredEntry {
            value: "v".to_string(),
            written_at: now,
            expires_at: now,
        };
        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert_eq!(entry.ttl_remaining_ms(), 0);
    }

    #[test]
    fn test_entry_ttl_remaining() {
        let entry = StoredEntry::new("v", in_secs(10));
        let remaining = entry.ttl_remaining_ms();
        assert!(remaining <= 10_000);
        assert!(remaining >= 9_000);
        assert!(!entry.is_expired());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new();
        backend.set("key1", "value1", in_secs(60)).await.unwrap();
        assert_eq!(backend.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing_is_none_not_error() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_value_and_expiry() {
        let backend = MemoryBackend::new();
        backend.set("key1", "old", in_secs(-1)).await.unwrap();
        backend.set("key1", "new", in_secs(60)).await.unwrap();
        assert_eq!(backend.get("key1").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_is_invisible_and_dropped() {
        let backend = MemoryBackend::new();
        backend.set("key1", "value1", in_secs(-1)).await.unwrap();

        assert_eq!(backend.get("key1").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.set("key1", "value1", in_secs(60)).await.unwrap();

        backend.delete("key1").await.unwrap();
        backend.delete("key1").await.unwrap();
        backend.delete("never_there").await.unwrap();
        assert_eq!(backend.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_count_matching_prefix_and_expiry() {
        let backend = MemoryBackend::new();
        backend.set("test.node.1", "a", in_secs(60)).await.unwrap();
        backend.set("test.node.2", "b", in_secs(60)).await.unwrap();
        backend.set("test.node.3", "c", in_secs(-1)).await.unwrap();
        backend.set("test_head", "h", in_secs(60)).await.unwrap();
        backend.set("other.node.1", "x", in_secs(60)).await.unwrap();

        assert_eq!(backend.count_matching("test.node.*").await.unwrap(), 2);
        assert_eq!(backend.count_matching("other.node.*").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let backend = MemoryBackend::with_namespace("ns:");
        backend.set("k", "v", in_secs(60)).await.unwrap();

        assert!(backend.entry("k").await.is_some());
        assert_eq!(backend.count_matching("k*").await.unwrap(), 1);
        assert_eq!(backend.entries.read().await.keys().next().unwrap(), "ns:k");
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        backend.set("key1", "value1", in_secs(-1)).await.unwrap();
        backend.set("key2", "value2", in_secs(60)).await.unwrap();

        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.len().await, 1);
        assert!(backend.get("key2").await.unwrap().is_some());
    }
}
