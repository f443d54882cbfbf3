//! Publishes randomly generated orders onto the input topic, for local
//! testing of the consumer pipeline.
//!
//! Environment: `KAFKA_BROKERS` (required), `KAFKA_TOPIC` (default
//! "orders"), `NUMBER_OF_MESSAGES` (default 10), `DELAY_MS` (default 500).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{error, info};
use uuid::Uuid;

use common::config::LogMode;
use common::telemetry::init_telemetry;
use domain::{Delivery, Item, Order, Payment};

fn random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn random_phone() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..10).map(|_| rng.gen_range(0..10).to_string()).collect();
    format!("+{digits}")
}

fn random_item() -> Item {
    let mut rng = rand::thread_rng();
    Item {
        chrt_id: rng.gen_range(0..10_000_000),
        track_number: format!("TRACK_{}", random_string(10)),
        price: rng.gen_range(100..1100),
        rid: Uuid::new_v4().to_string(),
        name: format!("Product_{}", random_string(5)),
        sale: rng.gen_range(0..50),
        size: random_string(3),
        total_price: rng.gen_range(100..1100),
        nm_id: rng.gen_range(0..1_000_000),
        brand: format!("Brand_{}", random_string(5)),
        status: rng.gen_range(0..5),
    }
}

fn random_order() -> Order {
    let mut rng = rand::thread_rng();
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();

    Order {
        order_uid: Uuid::new_v4().to_string(),
        track_number: format!("WBILMTESTTRACK_{}", random_string(5)),
        entry: Uuid::new_v4().to_string(),
        delivery: Delivery {
            name: format!("Customer {}", random_string(5)),
            phone: random_phone(),
            zip: random_string(6),
            city: format!("City_{}", random_string(5)),
            address: format!("Address_{}", random_string(10)),
            region: format!("Region_{}", random_string(5)),
            email: format!("{}@example.com", random_string(5)),
        },
        payment: Payment {
            transaction: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            currency: "USD".to_string(),
            provider: format!("payment_provider_{}", random_string(5)),
            amount: rng.gen_range(100..1100),
            payment_dt: now_secs,
            bank: format!("Bank_{}", random_string(5)),
            delivery_cost: rng.gen_range(0..100),
            goods_total: rng.gen_range(100..1100),
            custom_fee: rng.gen_range(0..50),
        },
        items: vec![random_item(), random_item()],
        locale: "en".to_string(),
        internal_signature: Uuid::new_v4().to_string(),
        customer_id: format!("customer_{}", random_string(8)),
        delivery_service: format!("delivery_service_{}", random_string(5)),
        shardkey: random_string(5),
        sm_id: rng.gen_range(0..100),
        date_created: format!("{now_secs}"),
        oof_shard: random_string(5),
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_telemetry(LogMode::Development);

    let brokers = std::env::var("KAFKA_BROKERS").context("KAFKA_BROKERS is not set")?;
    let topic = std::env::var("KAFKA_TOPIC").unwrap_or_else(|_| "orders".to_string());
    let count: usize = env_or("NUMBER_OF_MESSAGES", 10);
    let delay = Duration::from_millis(env_or("DELAY_MS", 500));

    info!(brokers = %brokers, topic = %topic, count, "publishing generated orders");

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "5000")
        .set("allow.auto.create.topics", "true")
        .create()
        .context("failed to create Kafka producer")?;

    for _ in 0..count {
        let order = random_order();
        let payload = serde_json::to_vec(&order)?;

        let record = FutureRecord::<str, [u8]>::to(&topic)
            .key(&order.order_uid)
            .payload(&payload);

        match producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok(_) => info!(order_uid = %order.order_uid, "order published"),
            Err((e, _)) => error!(order_uid = %order.order_uid, error = %e, "failed to publish order"),
        }

        tokio::time::sleep(delay).await;
    }

    Ok(())
}
