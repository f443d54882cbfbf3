mod lru;
mod restorer;

pub use lru::LruOrderCache;
pub use restorer::{CacheRestorer, RestoreError};

use domain::Order;

/// In-process hot set of orders keyed by `order_uid`.
///
/// All operations are safe under concurrent callers and none of them can
/// fail. `get` counts as a use and refreshes the entry's recency.
pub trait OrderCache: Send + Sync {
    /// Insert or replace, making the entry the most recently used.
    fn set(&self, order_uid: &str, order: Order);

    /// Look up and promote on hit.
    fn get(&self, order_uid: &str) -> Option<Order>;

    /// Remove the entry; returns whether it was present.
    fn delete(&self, order_uid: &str) -> bool;

    /// Drop all entries and reset recency.
    fn clear(&self);

    /// Up to `limit` entries from most to least recently used, without
    /// touching recency. A non-positive `limit` yields an empty vec.
    fn get_all(&self, limit: i64) -> Vec<Order>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idempotent; drops all entries.
    fn shutdown(&self);
}
