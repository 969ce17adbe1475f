use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref ATTEMPTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_attempts_created_total",
        "Attempts handed out, by origin",
        &["origin"]
    )
    .unwrap();

    pub static ref ANSWERS_GRADED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_answers_graded_total",
        "Answers graded, by question kind and verdict",
        &["kind", "accepted"]
    )
    .unwrap();

    pub static ref HISTORY_WRITE_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        "quiz_history_write_conflicts_total",
        "Submission history writes that lost an optimistic concurrency race"
    )
    .unwrap();

    pub static ref RETRIES_FULLY_MASTERED_TOTAL: IntCounter = register_int_counter!(
        "quiz_retries_fully_mastered_total",
        "Retry requests answered with nothing left to retry"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_attempt_created(origin: &str) {
    ATTEMPTS_CREATED_TOTAL.with_label_values(&[origin]).inc();
}

pub fn record_answer_graded(kind: &str, accepted: bool) {
    let accepted = if accepted { "true" } else { "false" };
    ANSWERS_GRADED_TOTAL
        .with_label_values(&[kind, accepted])
        .inc();
}
