use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use application::{OrderService, SaveOutcome, ServiceError};
use common::backoff::ExponentialBackoff;
use common::config::RetryConfig;
use common::metrics;
use domain::Order;

use crate::dlq::DlqProducer;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to create Kafka consumer: {0}")]
    Create(#[from] KafkaError),

    #[error(transparent)]
    Dlq(#[from] crate::dlq::DlqError),
}

#[derive(Debug, Error)]
enum ProcessingError {
    #[error("failed to decode message payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid order: {0}")]
    Validation(#[from] domain::ValidationError),

    #[error("message processing deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Service(ServiceError),
}

/// Consumer tuning, adapted from the application configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub dlq_topic: String,
    pub max_retries: u32,
    pub processing_time: Duration,
    pub min_bytes: i64,
    pub max_bytes: i64,
    pub max_wait: Duration,
    pub commit_interval: Duration,
    pub batch_timeout: Duration,
    pub batch_size: i64,
    pub retry: RetryConfig,
}

/// Group consumer over the order topic.
///
/// One task pulls messages sequentially, which preserves per-key order
/// within a partition. Each message is decoded, validated and persisted
/// through the query service; unprocessable or repeatedly failing messages
/// go to the dead-letter topic. The offset is stored only after the save or
/// the DLQ write completed, so a crash in between redelivers the message
/// (at-least-once; the store's idempotent upsert makes repeats safe).
pub struct OrderConsumer {
    consumer: Arc<StreamConsumer>,
    dlq: Arc<DlqProducer>,
    service: Arc<OrderService>,
    config: ConsumerConfig,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl OrderConsumer {
    pub fn new(config: ConsumerConfig, service: Arc<OrderService>) -> Result<Self, ConsumerError> {
        let brokers = config.brokers.join(",");

        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.group_id)
            .set("bootstrap.servers", &brokers)
            // Offsets are stored by hand after end-to-end processing and
            // committed on the configured interval.
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                config.commit_interval.as_millis().to_string(),
            )
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("allow.auto.create.topics", "true")
            .set("fetch.min.bytes", config.min_bytes.to_string())
            .set("fetch.max.bytes", config.max_bytes.to_string())
            .set("fetch.wait.max.ms", config.max_wait.as_millis().to_string())
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        let dlq = DlqProducer::new(
            &brokers,
            config.dlq_topic.clone(),
            config.batch_timeout,
            config.batch_size,
        )?;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            consumer: Arc::new(consumer),
            dlq: Arc::new(dlq),
            service,
            config,
            shutdown_tx,
            handle: None,
        })
    }

    /// Spawn the consume loop. Call once.
    pub fn start(&mut self) {
        info!(
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            "starting Kafka consumer"
        );

        let consumer = Arc::clone(&self.consumer);
        let dlq = Arc::clone(&self.dlq);
        let service = Arc::clone(&self.service);
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        self.handle = Some(tokio::spawn(async move {
            consume_loop(consumer, dlq, service, config, shutdown_rx).await;
        }));
    }

    /// Cancel the consume loop, wait for it and flush the DLQ producer,
    /// all bounded by one deadline.
    pub async fn shutdown(&mut self) {
        info!("Kafka consumer shutting down");
        let _ = self.shutdown_tx.send(true);

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;

        if let Some(handle) = self.handle.take() {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => info!("Kafka consumer stopped gracefully"),
                Ok(Err(e)) => error!(error = %e, "Kafka consumer task failed"),
                Err(_) => {
                    warn!("Kafka consumer shutdown timed out while waiting for the task");
                    return;
                }
            }
        }

        let dlq = Arc::clone(&self.dlq);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let flush = tokio::task::spawn_blocking(move || dlq.flush(remaining));
        match flush.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to flush DLQ producer"),
            Err(e) => error!(error = %e, "DLQ flush task failed"),
        }
    }
}

async fn consume_loop(
    consumer: Arc<StreamConsumer>,
    dlq: Arc<DlqProducer>,
    service: Arc<OrderService>,
    config: ConsumerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("Kafka consumer loop stopped");
                return;
            }
            result = consumer.recv() => match result {
                Ok(msg) => process_message(&consumer, &dlq, &service, &config, &msg).await,
                Err(e) => {
                    error!(error = %e, "failed to fetch Kafka message");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

async fn process_message(
    consumer: &StreamConsumer,
    dlq: &DlqProducer,
    service: &OrderService,
    config: &ConsumerConfig,
    msg: &BorrowedMessage<'_>,
) {
    let key = String::from_utf8_lossy(msg.key().unwrap_or_default()).into_owned();
    debug!(
        key = %key,
        topic = msg.topic(),
        partition = msg.partition(),
        offset = msg.offset(),
        "received Kafka message"
    );

    let started = Instant::now();

    // Decode and validation failures are permanent; they skip the retry
    // loop entirely.
    let order = match decode_order(msg.payload().unwrap_or_default()) {
        Ok(order) => order,
        Err(e) => {
            warn!(key = %key, error = %e, "unprocessable message, sending to DLQ");
            dead_letter(consumer, dlq, msg).await;
            return;
        }
    };

    match save_with_retry(service, &order, config).await {
        Ok(outcome) => {
            store_offset(consumer, msg);
            metrics::record_consumed_message("processed");
            info!(
                order_uid = %order.order_uid,
                result = outcome.as_str(),
                processing_ms = started.elapsed().as_millis() as u64,
                "successfully processed Kafka message"
            );
        }
        Err(e) => {
            error!(
                order_uid = %order.order_uid,
                error = %e,
                processing_ms = started.elapsed().as_millis() as u64,
                "failed to process message after retries, sending to DLQ"
            );
            dead_letter(consumer, dlq, msg).await;
        }
    }
}

/// Park the raw message on the dead-letter topic, then store the offset.
/// If the DLQ write fails the offset is left alone so the next fetch
/// redelivers the message.
async fn dead_letter(consumer: &StreamConsumer, dlq: &DlqProducer, msg: &BorrowedMessage<'_>) {
    match dlq.send(msg).await {
        Ok(()) => {
            metrics::record_consumed_message("dead_lettered");
            store_offset(consumer, msg);
        }
        Err(e) => {
            metrics::record_consumed_message("failed");
            error!(
                key = %String::from_utf8_lossy(msg.key().unwrap_or_default()),
                error = %e,
                "failed to send message to DLQ, offset not committed"
            );
        }
    }
}

fn store_offset(consumer: &StreamConsumer, msg: &BorrowedMessage<'_>) {
    // Failures are logged only; the next fetch redelivers and the store's
    // idempotency absorbs the repeat.
    if let Err(e) = consumer.store_offset_from_message(msg) {
        error!(
            topic = msg.topic(),
            partition = msg.partition(),
            offset = msg.offset(),
            error = %e,
            "failed to store message offset"
        );
    }
}

fn decode_order(payload: &[u8]) -> Result<Order, ProcessingError> {
    let order: Order = serde_json::from_slice(payload)?;
    order.validate()?;
    Ok(order)
}

/// Persist one order, retrying transient failures with jittered exponential
/// backoff. The loop is bounded three ways: the backoff schedule's elapsed
/// time, `max_retries` attempts, and the per-message `processing_time`
/// deadline.
async fn save_with_retry(
    service: &OrderService,
    order: &Order,
    config: &ConsumerConfig,
) -> Result<SaveOutcome, ProcessingError> {
    let attempts = async {
        let mut backoff = ExponentialBackoff::new(config.retry.clone());
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match service.save_order(order).await {
                Ok(outcome) => return Ok(outcome),
                Err(e @ ServiceError::Validation(_)) => {
                    return Err(ProcessingError::Service(e));
                }
                Err(e) => {
                    warn!(
                        order_uid = %order.order_uid,
                        attempt,
                        error = %e,
                        "failed to process message, retrying"
                    );
                    if config.max_retries > 0 && attempt >= config.max_retries {
                        return Err(ProcessingError::Service(e));
                    }
                    match backoff.next_interval() {
                        Some(interval) => tokio::time::sleep(interval).await,
                        None => return Err(ProcessingError::Service(e)),
                    }
                }
            }
        }
    };

    match tokio::time::timeout(config.processing_time, attempts).await {
        Ok(result) => result,
        Err(_) => Err(ProcessingError::DeadlineExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use cache::LruOrderCache;
    use domain::{Delivery, Item, Payment};
    use storage::{InMemoryOrderStore, OrderStore, StoreError};

    fn test_config() -> ConsumerConfig {
        ConsumerConfig {
            brokers: vec!["localhost:1".to_string()],
            topic: "orders".to_string(),
            group_id: "order-service-test".to_string(),
            dlq_topic: "orders-dlq".to_string(),
            max_retries: 5,
            processing_time: Duration::from_secs(5),
            min_bytes: 1,
            max_bytes: 1_000_000,
            max_wait: Duration::from_millis(100),
            commit_interval: Duration::from_millis(100),
            batch_timeout: Duration::from_millis(10),
            batch_size: 1,
            retry: RetryConfig {
                initial_interval: Duration::from_millis(1),
                multiplier: 1.5,
                max_interval: Duration::from_millis(5),
                max_elapsed_time: Duration::from_secs(2),
                randomization_factor: 0.0,
            },
        }
    }

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
                amount: 10,
                ..Payment::default()
            },
            items: vec![Item {
                chrt_id: 1,
                ..Item::default()
            }],
            ..Order::default()
        }
    }

    struct FlakyStore {
        inner: InMemoryOrderStore,
        remaining_failures: AtomicU32,
        save_calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryOrderStore::new(),
                remaining_failures: AtomicU32::new(failures),
                save_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderStore for FlakyStore {
        async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.remaining_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::SaveFailed(sqlx::Error::PoolTimedOut));
            }
            self.inner.save_order(order).await
        }
        async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
            self.inner.get_order(order_uid).await
        }
        async fn get_all_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
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

    fn service_over(store: Arc<FlakyStore>) -> OrderService {
        OrderService::new(Arc::new(LruOrderCache::new(100)), store, 10)
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = decode_order(b"{not json").unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_invalid_order() {
        let json = serde_json::to_vec(&Order::default()).unwrap();
        let err = decode_order(&json).unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
    }

    #[test]
    fn test_decode_accepts_valid_order() {
        let json = serde_json::to_vec(&order("a")).unwrap();
        assert_eq!(decode_order(&json).unwrap().order_uid, "a");
    }

    #[tokio::test]
    async fn test_transient_failure_is_applied_exactly_once() {
        let store = Arc::new(FlakyStore::new(2));
        let service = service_over(store.clone());

        let outcome = save_with_retry(&service, &order("a"), &test_config())
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Created);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.orders_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhaust_after_max_retries() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let service = service_over(store.clone());

        let err = save_with_retry(&service, &order("a"), &test_config())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Service(_)));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_processing_deadline_bounds_the_loop() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let service = service_over(store);

        let mut config = test_config();
        config.max_retries = 0; // unbounded attempts
        config.processing_time = Duration::from_millis(20);
        config.retry.max_elapsed_time = Duration::from_secs(60);

        let err = save_with_retry(&service, &order("a"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_validation_failure_is_permanent() {
        let store = Arc::new(FlakyStore::new(0));
        let service = service_over(store.clone());

        let mut bad = order("a");
        bad.items.clear();

        let err = save_with_retry(&service, &bad, &test_config())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::Service(ServiceError::Validation(_))
        ));
        // validation happens before the store is touched, no retries burned
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_consumer_creation_does_not_validate_connection() {
        let store = Arc::new(FlakyStore::new(0));
        let service = Arc::new(service_over(store));
        let result = OrderConsumer::new(test_config(), service);
        assert!(result.is_ok());
    }
}
