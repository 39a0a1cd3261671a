use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    // Order lifecycle
    pub static ref ORDERS_CREATED: IntCounter = register_int_counter!(
        "orders_created_total",
        "Total number of orders created"
    )
    .expect("metric can be created");

    pub static ref ORDERS_PAID: IntCounter = register_int_counter!(
        "orders_paid_total",
        "Total number of orders marked as paid"
    )
    .expect("metric can be created");

    pub static ref ORDERS_CANCELLED: IntCounter = register_int_counter!(
        "orders_cancelled_total",
        "Total number of orders cancelled"
    )
    .expect("metric can be created");

    // Reporting
    pub static ref REPORTS_IMMEDIATE: IntCounter = register_int_counter!(
        "reports_immediate_total",
        "Top products reports computed synchronously"
    )
    .expect("metric can be created");

    pub static ref REPORTS_DEFERRED: IntCounter = register_int_counter!(
        "reports_deferred_total",
        "Top products reports queued for email delivery"
    )
    .expect("metric can be created");

    pub static ref SUMMARIES_GENERATED: IntCounter = register_int_counter!(
        "daily_summaries_generated_total",
        "Daily sales summary rows generated or refreshed"
    )
    .expect("metric can be created");

    // Email delivery
    pub static ref EMAILS_SENT: IntCounter = register_int_counter!(
        "report_emails_sent_total",
        "Report emails handed to the mail channel"
    )
    .expect("metric can be created");

    pub static ref EMAILS_FAILED: IntCounter = register_int_counter!(
        "report_emails_failed_total",
        "Report emails dropped after exhausting retries"
    )
    .expect("metric can be created");

    // Background worker
    pub static ref JOBS_PROCESSED: IntCounter = register_int_counter!(
        "report_jobs_processed_total",
        "Background report jobs completed"
    )
    .expect("metric can be created");

    pub static ref JOBS_FAILED: IntCounter = register_int_counter!(
        "report_jobs_failed_total",
        "Background report jobs that failed an attempt"
    )
    .expect("metric can be created");
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
