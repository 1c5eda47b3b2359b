//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the mikansync daemon:
//! - HTTP request metrics (latency, counts)
//! - Reconciler and library state (collected dynamically)
//! - Core metrics (passes, announcements, imports, external services)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mikansync_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mikansync_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mikansync_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Reconciler and Library (collected dynamically)
// =============================================================================

/// Reconciler running state (1 = running, 0 = stopped).
pub static RECONCILER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mikansync_reconciler_running",
        "Whether the reconciler loops are running (1) or stopped (0)",
    )
    .unwrap()
});

/// Whether a feed URL is configured.
pub static FEED_CONFIGURED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mikansync_feed_configured",
        "Whether a subscription feed URL is configured (1) or not (0)",
    )
    .unwrap()
});

pub static LIBRARY_FILES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mikansync_library_files", "Number of files in the library").unwrap()
});

pub static LIBRARY_FOLDERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mikansync_library_folders", "Number of folders in the library").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Reconciler and library
    registry
        .register(Box::new(RECONCILER_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(FEED_CONFIGURED.clone())).unwrap();
    registry.register(Box::new(LIBRARY_FILES.clone())).unwrap();
    registry.register(Box::new(LIBRARY_FOLDERS.clone())).unwrap();

    // Core metrics (passes, importer, external services)
    for metric in mikansync_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the current reconciler and
/// library state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    RECONCILER_RUNNING.set(if state.reconciler().is_running() { 1 } else { 0 });
    FEED_CONFIGURED.set(if state.settings().snapshot().feed_url.is_some() {
        1
    } else {
        0
    });

    let library = state.library();
    if let Ok(files) = library.count_files().await {
        LIBRARY_FILES.set(files as i64);
    }
    if let Ok(folders) = library.count_folders().await {
        LIBRARY_FOLDERS.set(folders as i64);
    }
}
