use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use storage::{OrderStore, StoreError};

use crate::OrderCache;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("cache restoration timed out after restoring {restored} orders")]
    Timeout { restored: usize },

    #[error("failed to count orders: {0}")]
    Count(#[from] StoreError),
}

/// Repopulates the cache from the store in bounded time.
///
/// Restoration pages through the store in `batch_size` steps. A failing
/// batch is logged and skipped rather than aborting the run, and hitting
/// the deadline keeps whatever was restored so far. If the store holds more
/// orders than the cache capacity, later batches evict earlier ones.
pub struct CacheRestorer {
    cache: Arc<dyn OrderCache>,
    store: Arc<dyn OrderStore>,
    timeout: Duration,
    batch_size: i64,
}

impl CacheRestorer {
    pub fn new(
        cache: Arc<dyn OrderCache>,
        store: Arc<dyn OrderStore>,
        timeout: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            cache,
            store,
            timeout,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the number of orders restored into the cache.
    pub async fn restore(&self) -> Result<usize, RestoreError> {
        let deadline = Instant::now() + self.timeout;

        let total = self.store.orders_count().await.map_err(|e| {
            error!(error = %e, "failed to get orders count");
            e
        })?;

        info!(total, "starting cache restoration");

        let mut restored = 0usize;
        let mut offset = 0i64;
        while offset < total {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) else {
                warn!(restored, total, "cache restoration timed out");
                return Err(RestoreError::Timeout { restored });
            };

            let batch = tokio::time::timeout(
                remaining,
                self.store.get_all_orders(self.batch_size, offset),
            )
            .await;

            match batch {
                Err(_) => {
                    warn!(restored, total, "cache restoration timed out");
                    return Err(RestoreError::Timeout { restored });
                }
                Ok(Err(e)) => {
                    // A corrupt batch leaves a hole until the next restart;
                    // restoration must not block on it.
                    error!(error = %e, offset, limit = self.batch_size, "failed to get orders batch, skipping");
                }
                Ok(Ok(batch)) => {
                    let batch_len = batch.len();
                    for order in batch {
                        let uid = order.order_uid.clone();
                        self.cache.set(&uid, order);
                        restored += 1;
                    }
                    debug!(batch_size = batch_len, restored, "processed batch");
                }
            }

            offset += self.batch_size;
        }

        info!(restored, total, "cache restoration completed");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::LruOrderCache;
    use domain::Order;
    use storage::InMemoryOrderStore;

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            track_number: "TRACK".to_string(),
            ..Order::default()
        }
    }

    async fn seeded_store(count: usize) -> Arc<InMemoryOrderStore> {
        let store = Arc::new(InMemoryOrderStore::new());
        for i in 0..count {
            store.save_order(&order(&format!("uid-{i:03}"))).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_restores_everything_in_batches() {
        let store = seeded_store(5).await;
        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(100));

        let restorer = CacheRestorer::new(
            Arc::clone(&cache),
            store,
            Duration::from_secs(5),
            2,
        );

        let restored = restorer.restore().await.unwrap();
        assert_eq!(restored, 5);
        assert_eq!(cache.len(), 5);
        assert!(cache.get("uid-000").is_some());
        assert!(cache.get("uid-004").is_some());
    }

    #[tokio::test]
    async fn test_empty_store_restores_nothing() {
        let store = seeded_store(0).await;
        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(100));

        let restorer =
            CacheRestorer::new(Arc::clone(&cache), store, Duration::from_secs(1), 10);
        assert_eq!(restorer.restore().await.unwrap(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_keeps_partial_population() {
        let store = seeded_store(10).await;
        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(100));

        let restorer =
            CacheRestorer::new(Arc::clone(&cache), store, Duration::ZERO, 2);
        match restorer.restore().await {
            Err(RestoreError::Timeout { restored }) => assert_eq!(restored, 0),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eviction_during_restore_is_accepted() {
        let store = seeded_store(6).await;
        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(2));

        let restorer = CacheRestorer::new(
            Arc::clone(&cache),
            store,
            Duration::from_secs(5),
            2,
        );

        let restored = restorer.restore().await.unwrap();
        assert_eq!(restored, 6);
        // any subset that fits is warmer than cold
        assert_eq!(cache.len(), 2);
    }

    /// Fails `get_all_orders` for one specific offset.
    struct BadBatchStore {
        inner: Arc<InMemoryOrderStore>,
        bad_offset: i64,
    }

    #[async_trait]
    impl OrderStore for BadBatchStore {
        async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
            self.inner.save_order(order).await
        }

        async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
            self.inner.get_order(order_uid).await
        }

        async fn get_all_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
            if offset == self.bad_offset {
                return Err(StoreError::Query(sqlx::Error::PoolTimedOut));
            }
            self.inner.get_all_orders(limit, offset).await
        }

        async fn orders_count(&self) -> Result<i64, StoreError> {
            self.inner.orders_count().await
        }

        async fn delete_order(&self, order_uid: &str) -> Result<(), StoreError> {
            self.inner.delete_order(order_uid).await
        }

        async fn clear_orders(&self) -> Result<(), StoreError> {
            self.inner.clear_orders().await
        }

        async fn shutdown(&self) {}
    }

    #[tokio::test]
    async fn test_bad_batch_is_skipped() {
        let inner = seeded_store(6).await;
        let store = Arc::new(BadBatchStore {
            inner,
            bad_offset: 2,
        });
        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(100));

        let restorer = CacheRestorer::new(
            Arc::clone(&cache),
            store,
            Duration::from_secs(5),
            2,
        );

        let restored = restorer.restore().await.unwrap();
        assert_eq!(restored, 4, "the failing batch leaves a hole");
        assert!(cache.get("uid-002").is_none());
        assert!(cache.get("uid-003").is_none());
        assert!(cache.get("uid-000").is_some());
        assert!(cache.get("uid-005").is_some());
    }

    #[tokio::test]
    async fn test_count_failure_aborts() {
        struct FailingCount;

        #[async_trait]
        impl OrderStore for FailingCount {
            async fn save_order(&self, _order: &Order) -> Result<(), StoreError> {
                Ok(())
            }
            async fn get_order(&self, _order_uid: &str) -> Result<Order, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn get_all_orders(&self, _l: i64, _o: i64) -> Result<Vec<Order>, StoreError> {
                Ok(Vec::new())
            }
            async fn orders_count(&self) -> Result<i64, StoreError> {
                Err(StoreError::Query(sqlx::Error::PoolTimedOut))
            }
            async fn delete_order(&self, _order_uid: &str) -> Result<(), StoreError> {
                Ok(())
            }
            async fn clear_orders(&self) -> Result<(), StoreError> {
                Ok(())
            }
            async fn shutdown(&self) {}
        }

        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(10));
        let restorer = CacheRestorer::new(
            cache,
            Arc::new(FailingCount),
            Duration::from_secs(1),
            10,
        );
        assert!(matches!(
            restorer.restore().await,
            Err(RestoreError::Count(_))
        ));
    }
}
