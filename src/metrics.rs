//! Prometheus metrics for the query service
//!
//! Provides cache, service-operation, pool and ingestion metrics, exposed in
//! text format on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: cache operations (hit/miss/error/set/delete)
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec!(
        "kgraph_cache_operations_total",
        "Cache operations by type",
        &["operation"]
    )
    .expect("Failed to create cache_operations metric");

    /// Histogram: service operation duration (seconds)
    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "kgraph_operation_duration_seconds",
        "Duration of query service operations",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to create operation_duration metric");

    /// Counter: service operation errors by type
    pub static ref OPERATION_ERRORS: CounterVec = register_counter_vec!(
        "kgraph_operation_errors_total",
        "Query service errors by operation and error type",
        &["operation", "error_type"]
    )
    .expect("Failed to create operation_errors metric");

    /// Histogram: time spent waiting for a pooled connection (seconds)
    pub static ref POOL_WAIT: Histogram = register_histogram!(
        "kgraph_pool_wait_seconds",
        "Time spent waiting for a graph store connection",
        vec![0.0001, 0.001, 0.01, 0.1, 1.0, 5.0]
    )
    .expect("Failed to create pool_wait metric");

    /// Counter: ingestion writes by kind (node/relationship/skipped)
    pub static ref INGEST_WRITES: CounterVec = register_counter_vec!(
        "kgraph_ingest_writes_total",
        "Ingestion pipeline writes by kind",
        &["kind"]
    )
    .expect("Failed to create ingest_writes metric");
}

/// Record cache hit
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

/// Record cache miss
pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

/// Record a cache backend failure that was degraded to a miss
pub fn record_cache_error() {
    CACHE_OPERATIONS.with_label_values(&["error"]).inc();
}

pub fn record_cache_set() {
    CACHE_OPERATIONS.with_label_values(&["set"]).inc();
}

pub fn record_cache_delete() {
    CACHE_OPERATIONS.with_label_values(&["delete"]).inc();
}

/// Record a service operation duration
pub fn record_operation(operation: &str, duration_secs: f64) {
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Increment the service error counter
pub fn record_operation_error(operation: &str, error_type: &str) {
    OPERATION_ERRORS
        .with_label_values(&[operation, error_type])
        .inc();
}

/// Record how long a caller waited for a pooled connection
pub fn record_pool_wait(duration_secs: f64) {
    POOL_WAIT.observe(duration_secs);
}

/// Record an ingestion write
pub fn record_ingest(kind: &str) {
    INGEST_WRITES.with_label_values(&[kind]).inc();
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
