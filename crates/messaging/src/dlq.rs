use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use thiserror::Error;
use tracing::{info, warn};

use common::metrics;

#[derive(Debug, Error)]
pub enum DlqError {
    #[error("failed to create DLQ producer: {0}")]
    Create(#[from] KafkaError),

    #[error("failed to write message to DLQ: {0}")]
    Send(String),
}

/// Kafka producer for the dead-letter topic.
///
/// Dead-lettered messages keep their key, payload, timestamp and headers,
/// with an `original_topic` header appended for inspection tooling.
pub struct DlqProducer {
    producer: FutureProducer,
    topic: String,
}

impl DlqProducer {
    pub fn new(
        brokers: &str,
        topic: String,
        batch_timeout: Duration,
        batch_size: i64,
    ) -> Result<Self, DlqError> {
        info!(brokers, topic = %topic, "creating DLQ producer");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("linger.ms", batch_timeout.as_millis().to_string())
            .set("batch.num.messages", batch_size.max(1).to_string())
            .create()?;

        Ok(Self { producer, topic })
    }

    /// Forward a raw consumed message to the dead-letter topic.
    pub async fn send(&self, msg: &BorrowedMessage<'_>) -> Result<(), DlqError> {
        let mut headers = OwnedHeaders::new();
        if let Some(existing) = msg.headers() {
            for header in existing.iter() {
                headers = headers.insert(Header {
                    key: header.key,
                    value: header.value,
                });
            }
        }
        headers = headers.insert(Header {
            key: "original_topic",
            value: Some(msg.topic().as_bytes()),
        });

        let payload = msg.payload().unwrap_or_default();
        let mut record = FutureRecord::<[u8], [u8]>::to(&self.topic)
            .payload(payload)
            .headers(headers);
        if let Some(key) = msg.key() {
            record = record.key(key);
        }
        if let Some(ts) = msg.timestamp().to_millis() {
            record = record.timestamp(ts);
        }

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok(_) => {
                metrics::record_dlq_write();
                info!(
                    key = %String::from_utf8_lossy(msg.key().unwrap_or_default()),
                    original_topic = msg.topic(),
                    "message sent to DLQ"
                );
                Ok(())
            }
            Err((err, _)) => {
                warn!(error = %err, "failed to publish message to DLQ");
                Err(DlqError::Send(err.to_string()))
            }
        }
    }

    /// Flush buffered messages, bounded by `timeout`. Blocking; call from a
    /// blocking-friendly context.
    pub fn flush(&self, timeout: Duration) -> Result<(), KafkaError> {
        self.producer.flush(Timeout::After(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_creation_does_not_validate_connection() {
        let result = DlqProducer::new(
            "localhost:1",
            "orders-dlq".to_string(),
            Duration::from_millis(100),
            1,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_batch_size_floor() {
        // batch.num.messages must stay positive even for a zero config value
        let result = DlqProducer::new(
            "localhost:1",
            "orders-dlq".to_string(),
            Duration::from_millis(100),
            0,
        );
        assert!(result.is_ok());
    }
}
