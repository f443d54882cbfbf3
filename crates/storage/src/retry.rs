use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use common::backoff;
use common::config::RetryConfig;
use common::metrics;
use domain::Order;

use crate::{OrderStore, StoreError};

/// Wraps any order store with jittered exponential backoff around every
/// operation. The policy does not classify errors: an operation is retried
/// until it succeeds or the schedule's elapsed-time bound fires, and the
/// last error is returned as-is so callers can still match on identity
/// (`StoreError::NotFound` in particular).
pub struct RetryingOrderStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: OrderStore> RetryingOrderStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<S: OrderStore> OrderStore for RetryingOrderStore<S> {
    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = backoff::retry(&self.config, || async move {
            self.inner.save_order(order).await.map_err(|e| {
                warn!(order_uid = %order.order_uid, error = %e, "failed to save order, retrying");
                e
            })
        })
        .await;
        metrics::record_store_operation("save_order", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        let started = Instant::now();
        let result = backoff::retry(&self.config, || async move {
            self.inner.get_order(order_uid).await.map_err(|e| {
                warn!(order_uid, error = %e, "failed to get order, retrying");
                e
            })
        })
        .await;
        metrics::record_store_operation("get_order", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn get_all_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
        let started = Instant::now();
        let result = backoff::retry(&self.config, || async move {
            self.inner.get_all_orders(limit, offset).await.map_err(|e| {
                warn!(error = %e, "failed to get all orders, retrying");
                e
            })
        })
        .await;
        metrics::record_store_operation(
            "get_all_orders",
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn orders_count(&self) -> Result<i64, StoreError> {
        let started = Instant::now();
        let result = backoff::retry(&self.config, || async move {
            self.inner.orders_count().await.map_err(|e| {
                warn!(error = %e, "failed to get orders count, retrying");
                e
            })
        })
        .await;
        metrics::record_store_operation(
            "orders_count",
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn delete_order(&self, order_uid: &str) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = backoff::retry(&self.config, || async move {
            self.inner.delete_order(order_uid).await.map_err(|e| {
                warn!(order_uid, error = %e, "failed to delete order, retrying");
                e
            })
        })
        .await;
        metrics::record_store_operation(
            "delete_order",
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn clear_orders(&self) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = backoff::retry(&self.config, || async move {
            self.inner.clear_orders().await.map_err(|e| {
                warn!(error = %e, "failed to clear orders, retrying");
                e
            })
        })
        .await;
        metrics::record_store_operation(
            "clear_orders",
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}
