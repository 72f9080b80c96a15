//! Cache Node Module
//!
//! One entry of the eviction list. Nodes live in the backing store; the
//! in-process value is a lazily resolved proxy whose neighbours are either
//! already loaded ([`Link::Resolved`]) or only known by store key
//! ([`Link::Unresolved`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Node Id ==
/// Handle to a node loaded into a [`NodeRegistry`](super::NodeRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

// == Link ==
/// Adjacency pointer to another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Neighbour known only by its store key; resolving costs one round trip
    Unresolved(String),
    /// Neighbour already loaded in the current registry
    Resolved(NodeId),
}

impl From<NodeId> for Link {
    fn from(id: NodeId) -> Self {
        Link::Resolved(id)
    }
}

impl From<String> for Link {
    fn from(key: String) -> Self {
        Link::Unresolved(key)
    }
}

// == Node Record ==
/// Persisted form of a node: the JSON object stored under the node key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Store key of the previous node
    #[serde(default)]
    pub previous: Option<String>,
    /// Store key of the next node
    #[serde(default)]
    pub next: Option<String>,
    /// Caller payload, `null` for sentinels
    #[serde(default)]
    pub data: Option<Value>,
}

impl NodeRecord {
    /// Decodes a stored value; `None` when it is not a node record.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

// == Cache Node ==
/// In-process proxy for one persisted node.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheNode {
    key: String,
    pub(crate) data: Option<Value>,
    pub(crate) previous: Option<Link>,
    pub(crate) next: Option<Link>,
}

impl CacheNode {
    /// A node with no record in the store yet.
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: None,
            previous: None,
            next: None,
        }
    }

    /// Builds a node from its stored record. A supplied `data` overrides the
    /// stored payload.
    pub fn from_record(key: impl Into<String>, record: NodeRecord, data: Option<Value>) -> Self {
        Self {
            key: key.into(),
            data: data.or(record.data).filter(|v| !v.is_null()),
            previous: record.previous.map(Link::Unresolved),
            next: record.next.map(Link::Unresolved),
        }
    }

    /// Store key of this node.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Payload, `None` for sentinels and for keys not in the cache.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn previous(&self) -> Option<&Link> {
        self.previous.as_ref()
    }

    pub fn next(&self) -> Option<&Link> {
        self.next.as_ref()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_wire_format() {
        let record = NodeRecord {
            previous: Some("test_head".to_string()),
            next: None,
            data: Some(json!("a")),
        };
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded, json!({"previous": "test_head", "next": null, "data": "a"}));
    }

    #[test]
    fn test_record_decode_tolerates_missing_fields() {
        let record = NodeRecord::decode(r#"{"next":"test_tail"}"#).unwrap();
        assert_eq!(record.next.as_deref(), Some("test_tail"));
        assert!(record.previous.is_none());
        assert!(record.data.is_none());
    }

    #[test]
    fn test_record_decode_rejects_garbage() {
        assert!(NodeRecord::decode("not json").is_none());
        assert!(NodeRecord::decode("42").is_none());
    }

    #[test]
    fn test_from_record_links_are_unresolved() {
        let record = NodeRecord {
            previous: Some("p".to_string()),
            next: Some("n".to_string()),
            data: Some(json!(1)),
        };
        let node = CacheNode::from_record("k", record, None);
        assert_eq!(node.previous(), Some(&Link::Unresolved("p".to_string())));
        assert_eq!(node.next(), Some(&Link::Unresolved("n".to_string())));
        assert_eq!(node.data(), Some(&json!(1)));
    }

    #[test]
    fn test_supplied_data_overrides_record() {
        let record = NodeRecord {
            data: Some(json!("stored")),
            ..NodeRecord::default()
        };
        let node = CacheNode::from_record("k", record, Some(json!("fresh")));
        assert_eq!(node.data(), Some(&json!("fresh")));
    }

    #[test]
    fn test_empty_node() {
        let node = CacheNode::empty("k");
        assert_eq!(node.key(), "k");
        assert!(node.data().is_none());
        assert!(!node.has_next());
        assert!(!node.has_previous());
    }
}
