pub mod consumer;
pub mod dlq;

pub use consumer::{ConsumerConfig, ConsumerError, OrderConsumer};
pub use dlq::{DlqError, DlqProducer};
