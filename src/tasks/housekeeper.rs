//! Housekeeper Task
//!
//! Background task that periodically sweeps all partitions: expiring stale
//! entries, running refresh hooks, and enforcing per-partition limits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns the background housekeeper for a shared cache store.
///
/// The task runs in an infinite loop, sleeping for the configured sweep
/// interval between passes. Each pass calls [`CacheStore::sweep`], which does
/// its own fine-grained locking and recovers from hook failures locally; the
/// loop itself can never fail.
///
/// Nothing is drained or flushed at shutdown: aborting the returned handle
/// simply stops scheduling further sweeps.
///
/// # Arguments
/// * `store` - Shared cache store, also used directly by callers
/// * `interval` - Time between sweeps (see `CacheConfig::sweep_interval`)
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::<String>::new(&config)?);
/// let handle = spawn_housekeeper(store.clone(), config.sweep_interval());
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_housekeeper<V>(store: Arc<CacheStore<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Send + 'static,
{
    tokio::spawn(async move {
        info!("Starting cache housekeeper with interval of {:?}", interval);

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let report = store.sweep();
            if report.is_empty() {
                debug!("Housekeeping sweep: nothing to do");
            } else {
                info!(
                    "Housekeeping sweep: {} expired, {} refreshed, {} evicted",
                    report.expired, report.refreshed, report.evicted
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;

    #[tokio::test]
    async fn test_housekeeper_removes_expired_entries() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::default());
        store.add(
            "reports",
            "expire_soon",
            CacheEntry::new("value".to_string(), Some(Duration::from_millis(30))),
        );

        let handle = spawn_housekeeper(store.clone(), Duration::from_millis(50));

        // Wait for the entry to expire and a sweep to run
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.size("reports"), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_housekeeper_preserves_valid_entries() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::default());
        store.add(
            "reports",
            "long_lived",
            CacheEntry::new("value".to_string(), Some(Duration::from_secs(3600))),
        );

        let handle = spawn_housekeeper(store.clone(), Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(store.get("reports", "long_lived").unwrap(), "value");
        handle.abort();
    }

    #[tokio::test]
    async fn test_housekeeper_enforces_limits() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::default());
        store.set_limit("reports", Some(1));
        store.add(
            "reports",
            "old",
            CacheEntry::new("1".to_string(), Some(Duration::from_secs(3600))),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.add(
            "reports",
            "new",
            CacheEntry::new("2".to_string(), Some(Duration::from_secs(3600))),
        );

        let handle = spawn_housekeeper(store.clone(), Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(store.size("reports"), 1);
        assert!(store.contains("reports", "new"));
        assert!(!store.contains("reports", "old"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_housekeeper_can_be_aborted() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::default());
        let handle = spawn_housekeeper(store, Duration::from_millis(30));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
