//! Prometheus metrics for the hangar server.
//!
//! Exposes counters for block uploads, deduplication, commits, restores and
//! download plans, plus an HTTP request latency histogram.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no project ids, paths or hashes, only aggregate usage.
//! The endpoint MUST be network-restricted to authorized scrapers.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};
use std::time::Instant;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Block metrics
pub static BLOCKS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_blocks_uploaded_total",
        "Total number of blocks written to the object store",
    )
    .expect("metric creation failed")
});

pub static BLOCKS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_blocks_deduplicated_total",
        "Total number of block uploads skipped because the block was already stored",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_bytes_uploaded_total",
        "Total bytes uploaded (new blocks only)",
    )
    .expect("metric creation failed")
});

pub static BYTES_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_bytes_deduplicated_total",
        "Total bytes saved through deduplication",
    )
    .expect("metric creation failed")
});

pub static BLOCK_HASH_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_block_hash_mismatches_total",
        "Total number of block hash verification failures",
    )
    .expect("metric creation failed")
});

pub static BLOCK_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "hangar_block_upload_duration_seconds",
            "Time taken to upload a single block",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("hangar_upload_errors_total", "Total upload errors by error code"),
        &["error_type"],
    )
    .expect("metric creation failed")
});

// Revision metrics
pub static COMMITS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hangar_commits_created_total", "Total number of commits created")
        .expect("metric creation failed")
});

pub static COMMITS_NEEDING_BLOCKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_commits_needing_blocks_total",
        "Total number of proposed commits answered with missing content",
    )
    .expect("metric creation failed")
});

pub static RESTORES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hangar_restores_total", "Total number of project restores")
        .expect("metric creation failed")
});

pub static DOWNLOAD_PLANS_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hangar_download_plans_issued_total",
        "Total number of download plans issued",
    )
    .expect("metric creation failed")
});

// HTTP metrics
pub static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "hangar_http_request_duration_seconds",
            "HTTP request latency by method and status",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "status"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(BLOCKS_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOCKS_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOCK_HASH_MISMATCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOCK_UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(COMMITS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COMMITS_NEEDING_BLOCKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESTORES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOAD_PLANS_ISSUED.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Middleware recording request latency.
pub async fn track_http_metrics(req: Request, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}
