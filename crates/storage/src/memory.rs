use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::Order;

use crate::{OrderStore, StoreError};

/// In-memory order store keyed and ordered by `order_uid`, mirroring the
/// Postgres store's pagination order. Used by tests and local development.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<BTreeMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        self.orders
            .write()
            .await
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.orders
            .read()
            .await
            .get(order_uid)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_all_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
        let limit = limit.max(0) as usize;
        let offset = offset.max(0) as usize;
        Ok(self
            .orders
            .read()
            .await
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn orders_count(&self) -> Result<i64, StoreError> {
        Ok(self.orders.read().await.len() as i64)
    }

    async fn delete_order(&self, order_uid: &str) -> Result<(), StoreError> {
        match self.orders.write().await.remove(order_uid) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn clear_orders(&self) -> Result<(), StoreError> {
        self.orders.write().await.clear();
        Ok(())
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Delivery, Item, Payment};

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            track_number: "TRACK".to_string(),
            delivery: Delivery {
                phone: "+100".to_string(),
                email: "a@b".to_string(),
                ..Delivery::default()
            },
            payment: Payment {
                amount: 100,
                ..Payment::default()
            },
            items: vec![Item {
                chrt_id: 1,
                ..Item::default()
            }],
            ..Order::default()
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemoryOrderStore::new();
        store.save_order(&order("a")).await.unwrap();

        let fetched = store.get_order("a").await.unwrap();
        assert_eq!(fetched, order("a"));
        assert!(matches!(
            store.get_order("missing").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let store = InMemoryOrderStore::new();
        store.save_order(&order("a")).await.unwrap();
        store.save_order(&order("a")).await.unwrap();
        assert_eq!(store.orders_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pagination_is_ordered_by_uid() {
        let store = InMemoryOrderStore::new();
        for uid in ["c", "a", "b"] {
            store.save_order(&order(uid)).await.unwrap();
        }

        let page = store.get_all_orders(2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].order_uid, "a");
        assert_eq!(page[1].order_uid, "b");

        let rest = store.get_all_orders(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].order_uid, "c");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = InMemoryOrderStore::new();
        store.save_order(&order("a")).await.unwrap();
        store.save_order(&order("b")).await.unwrap();

        store.delete_order("a").await.unwrap();
        assert!(matches!(
            store.delete_order("a").await,
            Err(StoreError::NotFound)
        ));

        store.clear_orders().await.unwrap();
        assert_eq!(store.orders_count().await.unwrap(), 0);
    }
}
