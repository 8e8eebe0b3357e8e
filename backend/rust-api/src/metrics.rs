use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
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

    // Document store metrics
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of document store operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Document store operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Classroom lifecycle
    pub static ref CLASSROOM_FINALIZATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "classroom_finalizations_total",
        "Total number of classroom finalization attempts",
        &["status"]
    )
    .unwrap();

    pub static ref CLASSROOM_REVERTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "classroom_reverts_total",
        "Total number of classroom finalization reverts",
        &["status"]
    )
    .unwrap();

    pub static ref CLASSROOM_RESTARTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "classroom_restarts_total",
        "Total number of classroom restarts",
        &["status"]
    )
    .unwrap();

    // Messaging provider
    pub static ref WHATSAPP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "whatsapp_requests_total",
        "Total number of requests sent to the WhatsApp provider",
        &["operation", "status"]
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

/// Helper: track document store operation with metrics
pub async fn track_store_operation<F, T, E>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}
