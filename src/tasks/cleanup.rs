//! Expiry Sweep Task
//!
//! The memory backend only hides expired records on read; this task reclaims
//! them periodically so long-running processes do not accumulate dead nodes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryBackend;

/// Spawns a task purging expired records from `backend` every
/// `interval_secs` seconds. Abort the returned handle to stop it.
///
/// # Example
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let sweeper = spawn_cleanup_task(backend.clone(), 60);
/// // on shutdown
/// sweeper.abort();
/// ```
pub fn spawn_cleanup_task(backend: Arc<MemoryBackend>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!("Starting expiry sweep every {} seconds", interval.as_secs());

        loop {
            tokio::time::sleep(interval).await;

            let removed = backend.purge_expired().await;
            if removed > 0 {
                info!("Expiry sweep: purged {} records", removed);
            } else {
                debug!("Expiry sweep: nothing to purge");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Backend;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweep_purges_expired_records() {
        let backend = Arc::new(MemoryBackend::new());
        let soon = Utc::now() + chrono::Duration::milliseconds(500);
        backend.set("t.node.a", "{}", soon).await.unwrap();

        let handle = spawn_cleanup_task(backend.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(backend.entry("t.node.a").await.is_none());
        assert!(backend.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_records() {
        let backend = Arc::new(MemoryBackend::new());
        let later = Utc::now() + chrono::Duration::seconds(3600);
        backend.set("t.node.a", "{}", later).await.unwrap();

        let handle = spawn_cleanup_task(backend.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(backend.get("t.node.a").await.unwrap(), Some("{}".to_string()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_can_be_aborted() {
        let handle = spawn_cleanup_task(Arc::new(MemoryBackend::new()), 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }
}
