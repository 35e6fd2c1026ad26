//! Leaderboard Service Metrics
//!
//! Prometheus metrics for refresh cycles, upstream fetches and HTTP traffic

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};
use std::time::Duration;

static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "leaderboard_cycles_total",
        "Request cycles by outcome (cached/partial/quick_fetch/snapshot/rate_limited/error)",
        &["outcome"]
    )
    .expect("Failed to register leaderboard cycles metric")
});

static UPSTREAM_FETCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "leaderboard_upstream_fetches_total",
        "Upstream profile fetches by result class",
        &["result"]
    )
    .expect("Failed to register upstream fetches metric")
});

static BACKGROUND_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "leaderboard_background_runs_total",
        "Background refresh runs (success/degraded/failure/panic)",
        &["status"]
    )
    .expect("Failed to register background runs metric")
});

static CACHE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "leaderboard_cache_errors_total",
        "Storage failures treated as cache misses",
        &["operation"]
    )
    .expect("Failed to register cache errors metric")
});

static BATCH_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "leaderboard_refresh_batch_duration_seconds",
        "Duration of one concurrent fetch batch",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register batch duration metric")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "leaderboard_http_request_duration_seconds",
        "HTTP request latency",
        &["method", "path", "status"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP duration metric")
});

pub fn record_cycle(outcome: &str) {
    CYCLES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_upstream_fetch(result: &str) {
    UPSTREAM_FETCHES_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_background_run(status: &str) {
    BACKGROUND_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_cache_error(operation: &str) {
    CACHE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn observe_batch(duration: Duration) {
    BATCH_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn observe_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status.to_string()])
        .observe(duration.as_secs_f64());
}

/// `/metrics` in Prometheus text format
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Metrics encoding failed: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
