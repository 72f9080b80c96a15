//! Property-Based Tests for Cache Module
//!
//! Runs random operation sequences against the store-backed cache and a
//! plain in-process LRU model, then compares contents and recency order.

use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::cache::LruCache;
use crate::config::CacheSettings;
use crate::store::{Backend, MemoryBackend};

// == Reference Model ==
/// In-process LRU with the same observable behaviour.
/// Front = most recently used, back = least recently used.
#[derive(Debug, Default)]
struct LruModel {
    order: VecDeque<String>,
    values: HashMap<String, i64>,
    capacity: usize,
}

impl LruModel {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_front(key.to_string());
    }

    fn get(&mut self, key: &str) -> Option<i64> {
        let value = self.values.get(key).copied()?;
        self.touch(key);
        Some(value)
    }

    fn put(&mut self, key: &str, value: i64) {
        if self.capacity == 0 {
            return;
        }
        self.values.insert(key.to_string(), value);
        self.touch(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_back() {
                self.values.remove(&oldest);
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

// == Strategies ==
#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: i64 },
    Get { key: String },
}

/// Small key space so updates and hits actually happen.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h]"
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), any::<i64>()).prop_map(|(key, value)| CacheOp::Put { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Every lookup agrees with the model, and after every step the stored
    // list holds the same keys in the same recency order.
    #[test]
    fn prop_matches_reference_model(
        capacity in 0usize..6,
        ops in prop::collection::vec(cache_op_strategy(), 1..60)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
            let cache = LruCache::new(backend, CacheSettings::new("prop", capacity, 600))
                .await
                .unwrap();
            let mut model = LruModel::new(capacity);

            for op in ops {
                match op {
                    CacheOp::Put { key, value } => {
                        let stored = cache.put(&key, &value).await.unwrap();
                        prop_assert_eq!(stored, capacity > 0);
                        model.put(&key, value);
                    }
                    CacheOp::Get { key } => {
                        let got = cache.get::<i64>(&key).await.unwrap();
                        prop_assert_eq!(got, model.get(&key), "lookup of {}", key);
                    }
                }

                prop_assert_eq!(cache.cache_size().await.unwrap(), model.order.len());
                prop_assert_eq!(cache.ordered_keys().await.unwrap(), model.keys());
            }
            Ok(())
        })?;
    }

    // The live count never exceeds capacity once a put returns.
    #[test]
    fn prop_capacity_enforcement(
        capacity in 1usize..8,
        keys in prop::collection::vec("[a-z]{1,4}", 1..80)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
            let cache = LruCache::new(backend, CacheSettings::new("cap", capacity, 600))
                .await
                .unwrap();

            for key in keys {
                cache.put(&key, &key).await.unwrap();
                let size = cache.cache_size().await.unwrap();
                prop_assert!(size <= capacity, "size {} exceeds capacity {}", size, capacity);
            }
            Ok(())
        })?;
    }

    // Hits and misses recorded by the cache match what lookups returned.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
            let cache = LruCache::new(backend, CacheSettings::new("stats", 4, 600))
                .await
                .unwrap();
            let (mut hits, mut misses) = (0u64, 0u64);

            for op in ops {
                match op {
                    CacheOp::Put { key, value } => {
                        cache.put(&key, &value).await.unwrap();
                    }
                    CacheOp::Get { key } => match cache.get_value(&key).await.unwrap() {
                        Some(_) => hits += 1,
                        None => misses += 1,
                    },
                }
            }

            let stats = cache.stats().await;
            prop_assert_eq!(stats.hits, hits);
            prop_assert_eq!(stats.misses, misses);
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_evicts_oldest() {
        let mut model = LruModel::new(2);
        model.put("a", 1);
        model.put("b", 2);
        model.get("a");
        model.put("c", 3);
        assert_eq!(model.keys(), vec!["c", "a"]);
        assert_eq!(model.get("b"), None);
    }

    #[test]
    fn test_model_zero_capacity() {
        let mut model = LruModel::new(0);
        model.put("a", 1);
        assert!(model.keys().is_empty());
    }
}
