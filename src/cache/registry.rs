//! Node Registry Module
//!
//! Operation-scoped arena of loaded nodes. A registry is created at the start
//! of a cache operation and dropped at its end, so no node outlives the
//! operation that loaded it. Within that scope a store key always maps to the
//! same [`NodeId`], which keeps adjacency rewiring consistent while pointers
//! are followed one round trip at a time.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use super::node::{CacheNode, Link, NodeId, NodeRecord};
use crate::error::Result;
use crate::store::Backend;

// == Node Registry ==
/// Loaded nodes of one cache operation plus the node operations that touch
/// the backing store.
pub struct NodeRegistry<'a> {
    backend: &'a dyn Backend,
    /// Expiry granted on every flush
    ttl: chrono::Duration,
    nodes: Vec<CacheNode>,
    index: HashMap<String, NodeId>,
}

impl<'a> NodeRegistry<'a> {
    // == Constructor ==
    /// Creates an empty registry flushing with the given TTL.
    pub fn new(backend: &'a dyn Backend, ttl: Duration) -> Self {
        Self {
            backend,
            ttl: chrono::Duration::milliseconds(ttl.as_millis() as i64),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the loaded node behind `id`.
    pub fn node(&self, id: NodeId) -> &CacheNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut CacheNode {
        &mut self.nodes[id.0]
    }

    /// Id of `key` if it is registered.
    pub fn lookup(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn register(&mut self, node: CacheNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(node.key().to_string(), id);
        self.nodes.push(node);
        id
    }

    // == Load ==
    /// Resolves `key` to a node.
    ///
    /// A registered key costs nothing; otherwise exactly one store `get` is
    /// made. An absent or undecodable record yields an empty node. A supplied
    /// `data` overrides whatever payload was stored.
    pub async fn load(&mut self, key: &str, data: Option<Value>) -> Result<NodeId> {
        if let Some(id) = self.lookup(key) {
            if let Some(data) = data {
                self.node_mut(id).data = Some(data);
            }
            return Ok(id);
        }

        let node = match self.backend.get(key).await? {
            Some(raw) => match NodeRecord::decode(&raw) {
                Some(record) => CacheNode::from_record(key, record, data),
                None => {
                    warn!("Ignoring undecodable node record under {}", key);
                    empty_with(key, data)
                }
            },
            None => empty_with(key, data),
        };
        Ok(self.register(node))
    }

    // == Mutators ==
    /// Replaces the node payload, persisting it when `flush` is set.
    pub async fn set_data(&mut self, id: NodeId, data: Value, flush: bool) -> Result<()> {
        self.node_mut(id).data = Some(data).filter(|v| !v.is_null());
        if flush {
            self.flush(id).await?;
        }
        Ok(())
    }

    /// Points `id` forward at `next`, persisting it when `flush` is set.
    pub async fn set_next(&mut self, id: NodeId, next: Option<Link>, flush: bool) -> Result<()> {
        self.node_mut(id).next = next;
        if flush {
            self.flush(id).await?;
        }
        Ok(())
    }

    /// Points `id` backward at `previous`, persisting it when `flush` is set.
    pub async fn set_previous(
        &mut self,
        id: NodeId,
        previous: Option<Link>,
        flush: bool,
    ) -> Result<()> {
        self.node_mut(id).previous = previous;
        if flush {
            self.flush(id).await?;
        }
        Ok(())
    }

    // == Flush ==
    /// Writes `{previous, next, data}` under the node key and renews its
    /// expiry to now + TTL. Resolved neighbours are written by key.
    pub async fn flush(&self, id: NodeId) -> Result<()> {
        let node = self.node(id);
        let record = NodeRecord {
            previous: node.previous().map(|link| self.link_key(link)),
            next: node.next().map(|link| self.link_key(link)),
            data: node.data().cloned(),
        };
        let encoded = serde_json::to_string(&record)?;
        let expires_at = Utc::now() + self.ttl;

        debug!("flush {} (expires {})", node.key(), expires_at);
        self.backend.set(node.key(), &encoded, expires_at).await
    }

    // == Remove ==
    /// Deletes the persisted record and forgets the node.
    pub async fn remove(&mut self, id: NodeId) -> Result<()> {
        let key = self.node(id).key().to_string();
        self.backend.delete(&key).await?;
        if self.index.get(&key) == Some(&id) {
            self.index.remove(&key);
        }
        debug!("removed node {}", key);
        Ok(())
    }

    // == Traversal ==
    /// Follows the `next` pointer, loading the neighbour if needed.
    pub async fn next(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        let Some(link) = self.node(id).next.clone() else {
            return Ok(None);
        };
        let target = self.resolve(link).await?;
        self.node_mut(id).next = Some(Link::Resolved(target));
        Ok(Some(target))
    }

    /// Follows the `previous` pointer, loading the neighbour if needed.
    pub async fn previous(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        let Some(link) = self.node(id).previous.clone() else {
            return Ok(None);
        };
        let target = self.resolve(link).await?;
        self.node_mut(id).previous = Some(Link::Resolved(target));
        Ok(Some(target))
    }

    async fn resolve(&mut self, link: Link) -> Result<NodeId> {
        match link {
            Link::Resolved(id) => Ok(id),
            Link::Unresolved(key) => self.load(&key, None).await,
        }
    }

    fn link_key(&self, link: &Link) -> String {
        match link {
            Link::Resolved(id) => self.node(*id).key().to_string(),
            Link::Unresolved(key) => key.clone(),
        }
    }
}

fn empty_with(key: &str, data: Option<Value>) -> CacheNode {
    let mut node = CacheNode::empty(key);
    node.data = data.filter(|v| !v.is_null());
    node
}
