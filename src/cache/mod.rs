//! Cache Module
//!
//! Store-backed LRU cache: the eviction list is a doubly linked list whose
//! nodes are persisted one record per key in a shared [`Backend`](crate::store::Backend).

mod lru;
mod node;
mod registry;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use lru::LruCache;
pub use node::{CacheNode, Link, NodeId, NodeRecord};
pub use registry::NodeRegistry;
pub use stats::CacheStats;
