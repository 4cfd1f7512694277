//! Prometheus metrics for post-service.
//!
//! Exposes engagement collectors and an HTTP handler for the `/metrics` endpoint.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    /// Protocol operations by outcome (ok, noop, or an error kind).
    pub static ref ENGAGEMENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "post_service_engagement_total",
        "Counted-collection operations segmented by operation and outcome",
        &["operation", "outcome"]
    )
    .expect("failed to register post_service_engagement_total");

    /// Counter drift detected and repaired.
    pub static ref COUNTER_DRIFT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "post_service_counter_drift_total",
        "Counters found out of step with their child records",
        &["counter"]
    )
    .expect("failed to register post_service_counter_drift_total");

    /// Media objects that could not be removed after their post was deleted.
    pub static ref BLOB_CLEANUP_FAILURES: IntCounter = register_int_counter!(
        "post_service_blob_cleanup_failures_total",
        "Media blobs left behind after a committed post deletion"
    )
    .expect("failed to register post_service_blob_cleanup_failures_total");
}

pub fn record_outcome<T>(operation: &str, result: &crate::error::Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    ENGAGEMENT_TOTAL.with_label_values(&[operation, outcome]).inc();
}

/// Succeeded without changing anything, e.g. a like another request already stored
pub fn record_noop(operation: &str) {
    ENGAGEMENT_TOTAL.with_label_values(&[operation, "noop"]).inc();
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
