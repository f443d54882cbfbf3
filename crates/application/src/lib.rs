use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use cache::OrderCache;
use common::metrics;
use domain::{Order, ValidationError};
use storage::{OrderStore, StoreError};

/// How a save was classified against the cached state. Advisory only: the
/// store write is executed regardless, so a cold cache can never silently
/// drop an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
    Exists,
}

impl SaveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveOutcome::Created => "created",
            SaveOutcome::Updated => "updated",
            SaveOutcome::Exists => "exists",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("order not found")]
    NotFound,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound,
            other => ServiceError::Store(other),
        }
    }
}

/// Orchestrates the cache and the store behind the read/write API.
///
/// Reads go cache-first and populate the cache on a store hit. Writes go to
/// the store first and only then touch the cache, so the cache never holds
/// an order the store did not accept.
pub struct OrderService {
    cache: Arc<dyn OrderCache>,
    store: Arc<dyn OrderStore>,
    get_all_limit: i64,
}

impl OrderService {
    pub fn new(cache: Arc<dyn OrderCache>, store: Arc<dyn OrderStore>, get_all_limit: i64) -> Self {
        Self {
            cache,
            store,
            get_all_limit,
        }
    }

    pub async fn save_order(&self, order: &Order) -> Result<SaveOutcome, ServiceError> {
        let started = Instant::now();

        order.validate().map_err(|e| {
            warn!(order_uid = %order.order_uid, error = %e, "order validation failed");
            e
        })?;

        let outcome = match self.cache.get(&order.order_uid) {
            None => SaveOutcome::Created,
            Some(existing) if existing == *order => SaveOutcome::Exists,
            Some(_) => SaveOutcome::Updated,
        };

        self.store.save_order(order).await.map_err(|e| {
            error!(order_uid = %order.order_uid, error = %e, "failed to save order to store");
            ServiceError::from(e)
        })?;

        self.cache.set(&order.order_uid, order.clone());

        info!(
            order_uid = %order.order_uid,
            result = outcome.as_str(),
            duration_ms = started.elapsed().as_millis() as u64,
            "order saved"
        );
        Ok(outcome)
    }

    pub async fn get_order(&self, order_uid: &str) -> Result<Order, ServiceError> {
        if let Some(order) = self.cache.get(order_uid) {
            metrics::record_cache_request(true);
            info!(order_uid, "order retrieved from cache");
            return Ok(order);
        }
        metrics::record_cache_request(false);

        let order = self.store.get_order(order_uid).await.map_err(|e| {
            if matches!(e, StoreError::NotFound) {
                warn!(order_uid, "order not found in store");
            } else {
                error!(order_uid, error = %e, "failed to fetch order from store");
            }
            ServiceError::from(e)
        })?;

        self.cache.set(&order.order_uid, order.clone());
        info!(order_uid, "order retrieved from store and cached");
        Ok(order)
    }

    pub async fn get_all_orders(&self) -> Result<Vec<Order>, ServiceError> {
        let cached = self.cache.get_all(self.get_all_limit);
        if !cached.is_empty() {
            info!(count = cached.len(), source = "cache", "retrieved orders");
            return Ok(cached);
        }

        info!("cache is empty, retrieving orders from store");
        let orders = self
            .store
            .get_all_orders(self.get_all_limit, 0)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to retrieve orders from store");
                ServiceError::from(e)
            })?;

        for order in &orders {
            self.cache.set(&order.order_uid, order.clone());
        }
        info!(count = orders.len(), source = "store", "retrieved orders");
        Ok(orders)
    }

    pub async fn delete_order(&self, order_uid: &str) -> Result<(), ServiceError> {
        self.store.delete_order(order_uid).await.map_err(|e| {
            if matches!(e, StoreError::NotFound) {
                warn!(order_uid, "order not found in store");
            } else {
                error!(order_uid, error = %e, "failed to delete order from store");
            }
            ServiceError::from(e)
        })?;

        if !self.cache.delete(order_uid) {
            warn!(order_uid, "order not found in cache during deletion");
        }

        info!(order_uid, "order deleted");
        Ok(())
    }

    /// Cache first, store second: a crash in between leaves an empty cache
    /// over a still-populated store, which heals itself on the next read.
    pub async fn clear_orders(&self) -> Result<(), ServiceError> {
        self.cache.clear();

        self.store.clear_orders().await.map_err(|e| {
            error!(error = %e, "failed to clear orders from store");
            ServiceError::from(e)
        })?;

        info!("all orders cleared");
        Ok(())
    }
}
