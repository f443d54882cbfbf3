use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

use domain::{Delivery, Item, Order, Payment};

use crate::{OrderStore, StoreError};

/// PostgreSQL implementation of the order store.
///
/// The aggregate spans four tables (`orders`, `delivery`, `payment`,
/// `items`); children reference `orders(order_uid)` with cascading deletes.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool (useful for testing)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const UPSERT_ORDER: &str = r#"
    INSERT INTO orders (
        order_uid, track_number, entry, locale, internal_signature,
        customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        entry = EXCLUDED.entry,
        locale = EXCLUDED.locale,
        internal_signature = EXCLUDED.internal_signature,
        customer_id = EXCLUDED.customer_id,
        delivery_service = EXCLUDED.delivery_service,
        shardkey = EXCLUDED.shardkey,
        sm_id = EXCLUDED.sm_id,
        date_created = EXCLUDED.date_created,
        oof_shard = EXCLUDED.oof_shard
"#;

const UPSERT_DELIVERY: &str = r#"
    INSERT INTO delivery (
        order_uid, name, phone, zip, city, address, region, email
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (order_uid) DO UPDATE SET
        name = EXCLUDED.name,
        phone = EXCLUDED.phone,
        zip = EXCLUDED.zip,
        city = EXCLUDED.city,
        address = EXCLUDED.address,
        region = EXCLUDED.region,
        email = EXCLUDED.email
"#;

const UPSERT_PAYMENT: &str = r#"
    INSERT INTO payment (
        order_uid, transaction, request_id, currency, provider,
        amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        transaction = EXCLUDED.transaction,
        request_id = EXCLUDED.request_id,
        currency = EXCLUDED.currency,
        provider = EXCLUDED.provider,
        amount = EXCLUDED.amount,
        payment_dt = EXCLUDED.payment_dt,
        bank = EXCLUDED.bank,
        delivery_cost = EXCLUDED.delivery_cost,
        goods_total = EXCLUDED.goods_total,
        custom_fee = EXCLUDED.custom_fee
"#;

const INSERT_ITEM: &str = r#"
    INSERT INTO items (
        chrt_id, order_uid, track_number, price, rid, name,
        sale, size, total_price, nm_id, brand, status
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
"#;

const SELECT_ORDER: &str = r#"
    SELECT
        o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
        o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
        d.name AS delivery_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
        p.transaction, p.request_id, p.currency, p.provider, p.amount,
        p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee,
        i.chrt_id, i.track_number AS item_track_number, i.price, i.rid,
        i.name AS item_name, i.sale, i.size, i.total_price, i.nm_id, i.brand, i.status
    FROM orders o
    LEFT JOIN delivery d ON o.order_uid = d.order_uid
    LEFT JOIN payment p ON o.order_uid = p.order_uid
    LEFT JOIN items i ON o.order_uid = i.order_uid
    WHERE o.order_uid = $1
    ORDER BY i.chrt_id
"#;

const SELECT_ORDERS_PAGE: &str = r#"
    SELECT
        o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
        o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
        d.name AS delivery_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
        p.transaction, p.request_id, p.currency, p.provider, p.amount,
        p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    LEFT JOIN delivery d ON o.order_uid = d.order_uid
    LEFT JOIN payment p ON o.order_uid = p.order_uid
    ORDER BY o.order_uid
    LIMIT $1 OFFSET $2
"#;

const SELECT_ITEMS_FOR_ORDERS: &str = r#"
    SELECT
        chrt_id, order_uid, track_number, price, rid, name,
        sale, size, total_price, nm_id, brand, status
    FROM items
    WHERE order_uid = ANY($1)
    ORDER BY order_uid, chrt_id
"#;

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery {
            name: row.try_get::<Option<String>, _>("delivery_name")?.unwrap_or_default(),
            phone: row.try_get::<Option<String>, _>("phone")?.unwrap_or_default(),
            zip: row.try_get::<Option<String>, _>("zip")?.unwrap_or_default(),
            city: row.try_get::<Option<String>, _>("city")?.unwrap_or_default(),
            address: row.try_get::<Option<String>, _>("address")?.unwrap_or_default(),
            region: row.try_get::<Option<String>, _>("region")?.unwrap_or_default(),
            email: row.try_get::<Option<String>, _>("email")?.unwrap_or_default(),
        },
        payment: Payment {
            transaction: row.try_get::<Option<String>, _>("transaction")?.unwrap_or_default(),
            request_id: row.try_get::<Option<String>, _>("request_id")?.unwrap_or_default(),
            currency: row.try_get::<Option<String>, _>("currency")?.unwrap_or_default(),
            provider: row.try_get::<Option<String>, _>("provider")?.unwrap_or_default(),
            amount: row.try_get::<Option<i64>, _>("amount")?.unwrap_or_default(),
            payment_dt: row.try_get::<Option<i64>, _>("payment_dt")?.unwrap_or_default(),
            bank: row.try_get::<Option<String>, _>("bank")?.unwrap_or_default(),
            delivery_cost: row.try_get::<Option<i64>, _>("delivery_cost")?.unwrap_or_default(),
            goods_total: row.try_get::<Option<i64>, _>("goods_total")?.unwrap_or_default(),
            custom_fee: row.try_get::<Option<i64>, _>("custom_fee")?.unwrap_or_default(),
        },
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    })
}

/// Item columns out of the joined order select; `None` when the LEFT JOIN
/// produced no item row.
fn joined_item_from_row(row: &PgRow) -> Result<Option<Item>, sqlx::Error> {
    let chrt_id: Option<i64> = row.try_get("chrt_id")?;
    let Some(chrt_id) = chrt_id else {
        return Ok(None);
    };
    Ok(Some(Item {
        chrt_id,
        track_number: row.try_get::<Option<String>, _>("item_track_number")?.unwrap_or_default(),
        price: row.try_get::<Option<i64>, _>("price")?.unwrap_or_default(),
        rid: row.try_get::<Option<String>, _>("rid")?.unwrap_or_default(),
        name: row.try_get::<Option<String>, _>("item_name")?.unwrap_or_default(),
        sale: row.try_get::<Option<i64>, _>("sale")?.unwrap_or_default(),
        size: row.try_get::<Option<String>, _>("size")?.unwrap_or_default(),
        total_price: row.try_get::<Option<i64>, _>("total_price")?.unwrap_or_default(),
        nm_id: row.try_get::<Option<i64>, _>("nm_id")?.unwrap_or_default(),
        brand: row.try_get::<Option<String>, _>("brand")?.unwrap_or_default(),
        status: row.try_get::<Option<i64>, _>("status")?.unwrap_or_default(),
    }))
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Transaction)?;

        sqlx::query(UPSERT_ORDER)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shardkey)
            .bind(order.sm_id)
            .bind(&order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(order_uid = %order.order_uid, error = %e, "failed to save order row");
                StoreError::SaveFailed(e)
            })?;

        sqlx::query(UPSERT_DELIVERY)
            .bind(&order.order_uid)
            .bind(&order.delivery.name)
            .bind(&order.delivery.phone)
            .bind(&order.delivery.zip)
            .bind(&order.delivery.city)
            .bind(&order.delivery.address)
            .bind(&order.delivery.region)
            .bind(&order.delivery.email)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(order_uid = %order.order_uid, error = %e, "failed to save delivery");
                StoreError::SaveFailed(e)
            })?;

        sqlx::query(UPSERT_PAYMENT)
            .bind(&order.order_uid)
            .bind(&order.payment.transaction)
            .bind(&order.payment.request_id)
            .bind(&order.payment.currency)
            .bind(&order.payment.provider)
            .bind(order.payment.amount)
            .bind(order.payment.payment_dt)
            .bind(&order.payment.bank)
            .bind(order.payment.delivery_cost)
            .bind(order.payment.goods_total)
            .bind(order.payment.custom_fee)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(order_uid = %order.order_uid, error = %e, "failed to save payment");
                StoreError::SaveFailed(e)
            })?;

        // Items are replaced wholesale so a shrinking item set leaves no
        // orphaned rows behind.
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(order_uid = %order.order_uid, error = %e, "failed to delete existing items");
                StoreError::SaveFailed(e)
            })?;

        for item in &order.items {
            sqlx::query(INSERT_ITEM)
                .bind(item.chrt_id)
                .bind(&order.order_uid)
                .bind(&item.track_number)
                .bind(item.price)
                .bind(&item.rid)
                .bind(&item.name)
                .bind(item.sale)
                .bind(&item.size)
                .bind(item.total_price)
                .bind(item.nm_id)
                .bind(&item.brand)
                .bind(item.status)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!(order_uid = %order.order_uid, chrt_id = item.chrt_id, error = %e, "failed to save item");
                    StoreError::SaveFailed(e)
                })?;
        }

        tx.commit().await.map_err(StoreError::Transaction)?;

        debug!(order_uid = %order.order_uid, items = order.items.len(), "order saved");
        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        let rows = sqlx::query(SELECT_ORDER)
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(order_uid, error = %e, "failed to get order");
                StoreError::Query(e)
            })?;

        let Some(first) = rows.first() else {
            return Err(StoreError::NotFound);
        };

        let mut order = order_from_row(first).map_err(StoreError::Query)?;
        for row in &rows {
            if let Some(item) = joined_item_from_row(row).map_err(StoreError::Query)? {
                order.items.push(item);
            }
        }

        Ok(order)
    }

    async fn get_all_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(SELECT_ORDERS_PAGE)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to get orders page");
                StoreError::Query(e)
            })?;

        let mut orders = Vec::with_capacity(rows.len());
        let mut index_by_uid: HashMap<String, usize> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let order = order_from_row(row).map_err(StoreError::Query)?;
            index_by_uid.insert(order.order_uid.clone(), orders.len());
            orders.push(order);
        }

        if orders.is_empty() {
            return Ok(orders);
        }

        // One batched item fetch for the whole page instead of a query per
        // order.
        let uids: Vec<String> = orders.iter().map(|o| o.order_uid.clone()).collect();
        let item_rows = sqlx::query(SELECT_ITEMS_FOR_ORDERS)
            .bind(&uids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to get items for orders page");
                StoreError::Query(e)
            })?;

        for row in &item_rows {
            let order_uid: String = row.try_get("order_uid").map_err(StoreError::Query)?;
            let item = item_from_row(row).map_err(StoreError::Query)?;
            if let Some(&idx) = index_by_uid.get(&order_uid) {
                orders[idx].items.push(item);
            }
        }

        Ok(orders)
    }

    async fn orders_count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to get orders count");
                StoreError::Query(e)
            })
    }

    async fn delete_order(&self, order_uid: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE order_uid = $1")
            .bind(order_uid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(order_uid, error = %e, "failed to delete order");
                StoreError::DeleteFailed(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn clear_orders(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM orders")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to clear orders");
                StoreError::ClearFailed(e)
            })?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.pool.close().await;
    }
}
