//! LRU Cache Module
//!
//! Least-recently-used cache whose doubly linked eviction list is persisted
//! node by node in the backing store.
//!
//! ```text
//! <prefix>_head <-> <prefix>.node.<k1> <-> ... <-> <prefix>.node.<kn> <-> <prefix>_tail
//!                   most recently used              least recently used
//! ```
//!
//! # Consistency
//! Moving a node is several independent store round trips. Inside one
//! process every `get`/`put` of a cache (and of its clones) runs under one
//! mutex, so list mutations for a prefix are serialised. Nothing serialises
//! two processes sharing a prefix: their interleaved rewiring can orphan a
//! node, form a cycle or delete a node twice. Sharing a prefix across
//! processes is only safe for best-effort caching, and any stronger use must
//! add a lock in the store itself.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::node::{Link, NodeId};
use super::registry::NodeRegistry;
use super::stats::CacheStats;
use crate::config::CacheSettings;
use crate::error::{CacheError, Result};
use crate::store::Backend;

// == LRU Cache ==
/// LRU cache persisted in a shared [`Backend`]. Clones share the same list lock.
#[derive(Debug, Clone)]
pub struct LruCache {
    backend: Arc<dyn Backend>,
    settings: CacheSettings,
    head_key: String,
    tail_key: String,
    node_pattern: String,
    /// Held for the whole of every operation; guards the stats as well
    state: Arc<Mutex<CacheStats>>,
}

impl LruCache {
    // == Constructor ==
    /// Creates the cache, linking the head and tail sentinels if the store
    /// does not hold them yet.
    ///
    /// # Errors
    /// - `InvalidConfiguration` for an empty prefix or a zero TTL
    /// - `StoreUnavailable` if the sentinels cannot be read or written
    pub async fn new(backend: Arc<dyn Backend>, settings: CacheSettings) -> Result<Self> {
        settings.validate()?;

        let cache = Self {
            head_key: format!("{}_head", settings.prefix),
            tail_key: format!("{}_tail", settings.prefix),
            node_pattern: format!("{}.node.*", settings.prefix),
            backend,
            settings,
            state: Arc::new(Mutex::new(CacheStats::new())),
        };

        {
            let _guard = cache.state.lock().await;
            let mut registry = cache.registry();
            cache.link_sentinels(&mut registry).await?;
        }

        info!(
            "LRU cache '{}' ready: capacity={}, ttl={}s",
            cache.settings.prefix,
            cache.settings.capacity,
            cache.settings.ttl.as_secs()
        );
        Ok(cache)
    }

    // == Accessors ==
    pub fn prefix(&self) -> &str {
        &self.settings.prefix
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    /// Store key of the node holding `key`.
    pub fn node_key(&self, key: &str) -> String {
        format!("{}.node.{}", self.settings.prefix, key)
    }

    /// Snapshot of this process's counters.
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.clone()
    }

    fn registry(&self) -> NodeRegistry<'_> {
        NodeRegistry::new(self.backend.as_ref(), self.settings.ttl)
    }

    // == Get ==
    /// Looks `key` up and decodes its payload as `T`.
    ///
    /// A hit moves the entry to the most recently used position.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Looks `key` up, returning the raw payload.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let mut stats = self.state.lock().await;
        let mut registry = self.registry();

        let id = registry.load(&self.node_key(key), None).await?;
        let Some(data) = registry.node(id).data().cloned() else {
            stats.record_miss();
            debug!("cache '{}' miss for {}", self.settings.prefix, key);
            return Ok(None);
        };

        // refresh recency
        let head = registry.load(&self.head_key, None).await?;
        self.detach(&mut registry, id).await?;
        self.attach(&mut registry, head, id).await?;

        stats.record_hit();
        Ok(Some(data))
    }

    // == Put ==
    /// Stores `value` under `key` as the most recently used entry.
    ///
    /// Returns `false` without touching the store when the capacity is zero.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        self.put_value(key, serde_json::to_value(value)?).await
    }

    /// Stores a raw payload under `key`. `null` cannot be cached.
    pub async fn put_value(&self, key: &str, data: Value) -> Result<bool> {
        if self.settings.capacity == 0 {
            debug!("cache '{}' has zero capacity, not inserting {}", self.settings.prefix, key);
            return Ok(false);
        }
        if data.is_null() {
            return Err(CacheError::InvalidRequest(format!(
                "cannot cache null under {}",
                key
            )));
        }

        let mut stats = self.state.lock().await;
        let mut registry = self.registry();

        let id = registry.load(&self.node_key(key), None).await?;
        if registry.node(id).data().is_some() {
            let head = registry.load(&self.head_key, None).await?;
            self.detach(&mut registry, id).await?;
            self.attach(&mut registry, head, id).await?;
            registry.set_data(id, data, true).await?;
            stats.record_update();
        } else {
            registry.set_data(id, data, true).await?;
            let (head, tail) = self.link_sentinels(&mut registry).await?;
            self.attach(&mut registry, head, id).await?;
            // the tail is otherwise only rewritten when the list empties
            registry.flush(tail).await?;
            stats.record_insert();

            for _ in 0..self.clean_old_nodes(&mut registry, head, tail).await? {
                stats.record_eviction();
            }
        }
        Ok(true)
    }

    // == Cache Size ==
    /// Number of live entries under this prefix, sentinels excluded.
    pub async fn cache_size(&self) -> Result<usize> {
        self.backend.count_matching(&self.node_pattern).await
    }

    // == Ordered Keys ==
    /// Caller keys from most to least recently used, read by walking the list.
    ///
    /// The walk stops at the tail, at an expired entry, or on revisiting a node.
    pub async fn ordered_keys(&self) -> Result<Vec<String>> {
        let _guard = self.state.lock().await;
        let mut registry = self.registry();
        let node_prefix = self.node_key("");

        let head = registry.load(&self.head_key, None).await?;
        let mut seen = HashSet::from([head]);
        let mut keys = Vec::new();
        let mut cursor = registry.next(head).await?;

        while let Some(id) = cursor {
            if !seen.insert(id) || registry.node(id).key() == self.tail_key {
                break;
            }
            let node = registry.node(id);
            if node.data().is_none() {
                // expired entry: its own pointers are gone
                break;
            }
            if let Some(key) = node.key().strip_prefix(&node_prefix) {
                keys.push(key.to_string());
            }
            cursor = registry.next(id).await?;
        }
        Ok(keys)
    }

    // == List Maintenance ==
    /// Loads both sentinels and restores whichever pointer is missing, either
    /// on first use or after a sentinel expired.
    async fn link_sentinels(&self, registry: &mut NodeRegistry<'_>) -> Result<(NodeId, NodeId)> {
        let head = registry.load(&self.head_key, None).await?;
        let tail = registry.load(&self.tail_key, None).await?;

        if !registry.node(head).has_next() {
            registry.set_next(head, Some(tail.into()), true).await?;
        }
        if !registry.node(tail).has_previous() {
            if registry.next(head).await? == Some(tail) {
                registry.set_previous(tail, Some(head.into()), true).await?;
            } else {
                // tail expired under a populated list
                self.relink_tail(registry, head, tail).await?;
            }
        }
        Ok((head, tail))
    }

    /// Whether `id` may be rewritten as a neighbour. An expired entry's
    /// record is gone; rewriting it would leave a data-less node that still
    /// counts towards the size.
    fn is_linkable(&self, registry: &NodeRegistry<'_>, id: NodeId) -> bool {
        let node = registry.node(id);
        node.data().is_some() || node.key() == self.head_key || node.key() == self.tail_key
    }

    /// Inserts `id` right after `head`. Neighbours are flushed by their
    /// setters, `id` itself once at the end.
    async fn attach(&self, registry: &mut NodeRegistry<'_>, head: NodeId, id: NodeId) -> Result<()> {
        registry.set_previous(id, Some(head.into()), false).await?;

        let mut first = registry.next(head).await?;
        if first == Some(id) {
            // head still points at an expired incarnation of this key
            first = registry.next(id).await?;
        }
        registry.set_next(id, first.map(Link::Resolved), false).await?;

        let first = first.filter(|f| self.is_linkable(registry, *f));
        if let Some(first) = first {
            registry.set_previous(first, Some(id.into()), true).await?;
        }
        registry.set_next(head, Some(id.into()), true).await?;
        registry.flush(id).await
    }

    /// Unlinks `id` by pointing its neighbours at each other. The pointers of
    /// `id` itself are left stale for the caller to overwrite.
    async fn detach(&self, registry: &mut NodeRegistry<'_>, id: NodeId) -> Result<()> {
        let previous = registry.previous(id).await?;
        let next = registry.next(id).await?;
        if previous.is_none() || next.is_none() {
            warn!(
                "detaching {} with a missing neighbour (previous={:?}, next={:?})",
                registry.node(id).key(),
                previous,
                next
            );
        }

        let live_previous = previous.filter(|p| self.is_linkable(registry, *p));
        let live_next = next.filter(|n| self.is_linkable(registry, *n));
        if let Some(previous_id) = live_previous {
            registry.set_next(previous_id, next.map(Link::Resolved), true).await?;
        }
        if let Some(next_id) = live_next {
            registry.set_previous(next_id, previous.map(Link::Resolved), true).await?;
        }
        Ok(())
    }

    /// Points the tail back at the last live node reachable from the head.
    /// Used when the entries at the old end of the list have expired.
    async fn relink_tail(&self, registry: &mut NodeRegistry<'_>, head: NodeId, tail: NodeId) -> Result<()> {
        let mut last = head;
        let mut seen = HashSet::from([head]);
        while let Some(next) = registry.next(last).await? {
            if next == tail || !seen.insert(next) || registry.node(next).data().is_none() {
                break;
            }
            last = next;
        }

        debug!(
            "cache '{}' relinking tail after {}",
            self.settings.prefix,
            registry.node(last).key()
        );
        registry.set_next(last, Some(tail.into()), true).await?;
        registry.set_previous(tail, Some(last.into()), true).await
    }

    /// Evicts least recently used nodes until the live count fits the
    /// capacity, re-counting after every removal. Returns how many were evicted.
    async fn clean_old_nodes(
        &self,
        registry: &mut NodeRegistry<'_>,
        head: NodeId,
        tail: NodeId,
    ) -> Result<u64> {
        let mut evicted = HashSet::new();
        let mut relinked = false;

        loop {
            let size = self.backend.count_matching(&self.node_pattern).await?;
            if size <= self.settings.capacity {
                break;
            }

            let victim = match registry.previous(tail).await? {
                Some(victim) if victim != head && !evicted.contains(&victim) => victim,
                _ => {
                    warn!(
                        "cache '{}' holds {} entries (capacity {}) but has nothing left to evict",
                        self.settings.prefix, size, self.settings.capacity
                    );
                    break;
                }
            };

            if registry.node(victim).data().is_none() {
                // the tail points at an entry that already expired
                if relinked {
                    warn!(
                        "cache '{}' list is broken near the tail, giving up eviction",
                        self.settings.prefix
                    );
                    break;
                }
                self.relink_tail(registry, head, tail).await?;
                relinked = true;
                continue;
            }

            self.detach(registry, victim).await?;
            registry.remove(victim).await?;
            evicted.insert(victim);
            debug!("cache '{}' evicted {}", self.settings.prefix, registry.node(victim).key());
        }

        Ok(evicted.len() as u64)
    }
}
