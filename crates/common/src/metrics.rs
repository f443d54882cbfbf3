use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};

lazy_static! {
    // Consumer metrics
    pub static ref CONSUMER_MESSAGES: CounterVec = register_counter_vec!(
        "orders_consumer_messages_total",
        "Total number of stream messages processed",
        &["outcome"]
    )
    .expect("metric cannot be created");

    pub static ref DLQ_MESSAGES: IntCounter = register_int_counter!(
        "orders_dlq_messages_total",
        "Total number of messages routed to the dead-letter topic"
    )
    .expect("metric cannot be created");

    // Cache metrics
    pub static ref CACHE_REQUESTS: CounterVec = register_counter_vec!(
        "orders_cache_requests_total",
        "Total number of cache lookups",
        &["status"]
    )
    .expect("metric cannot be created");

    // Store metrics
    pub static ref STORE_OPERATIONS: CounterVec = register_counter_vec!(
        "orders_store_operations_total",
        "Total number of store operations",
        &["operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "orders_store_duration_seconds",
        "Store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("metric cannot be created");
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one consumed stream message
/// ("processed", "dead_lettered" or "failed").
pub fn record_consumed_message(outcome: &str) {
    CONSUMER_MESSAGES.with_label_values(&[outcome]).inc();
}

/// Record a completed write to the dead-letter topic
pub fn record_dlq_write() {
    DLQ_MESSAGES.inc();
}

/// Record a cache hit or miss
pub fn record_cache_request(hit: bool) {
    let status = if hit { "hit" } else { "miss" };
    CACHE_REQUESTS.with_label_values(&[status]).inc();
}

/// Record a store operation with its duration
pub fn record_store_operation(operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };
    STORE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    STORE_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}
