//! abtest_cache - A/B-testing client with a store-backed LRU cache
//!
//! Experiment results and trigger-event markers are cached in an LRU whose
//! doubly linked list lives node by node in Redis or Memcached, so several
//! processes can share one cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod tasks;

pub use cache::LruCache;
pub use client::AbTestingClient;
pub use config::{CacheSettings, Config, StoreConfig};
pub use error::{CacheError, Result};
pub use store::Backend;
pub use tasks::spawn_cleanup_task;
