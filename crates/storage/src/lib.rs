pub mod memory;
mod postgres;
mod retry;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;
pub use retry::RetryingOrderStore;

use async_trait::async_trait;
use thiserror::Error;

use domain::Order;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order not found")]
    NotFound,

    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("failed to save order: {0}")]
    SaveFailed(#[source] sqlx::Error),

    #[error("failed to delete order: {0}")]
    DeleteFailed(#[source] sqlx::Error),

    #[error("failed to clear orders: {0}")]
    ClearFailed(#[source] sqlx::Error),
}

/// Durable persistence of the order graph.
///
/// Implementations are swappable: the Postgres store for production, the
/// in-memory store for tests, and the retrying wrapper composes over either.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Idempotent upsert of the whole aggregate (orders, delivery, payment,
    /// items) in one transaction. Items are replaced wholesale.
    async fn save_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Paginated read ordered by `order_uid`.
    async fn get_all_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError>;

    async fn orders_count(&self) -> Result<i64, StoreError>;

    async fn delete_order(&self, order_uid: &str) -> Result<(), StoreError>;

    async fn clear_orders(&self) -> Result<(), StoreError>;

    /// Release underlying resources. Errors are logged, never raised.
    async fn shutdown(&self);
}
