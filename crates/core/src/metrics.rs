//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Reconciler passes (announce, import)
//! - Announcement and file import outcomes
//! - External services (qBittorrent, feed, Mikan pages)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Reconciler - Pass Metrics
// =============================================================================

/// Completed passes by loop and result.
pub static PASSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mikansync_passes_total", "Total reconciler passes"),
        &["loop", "result"], // loop: "announce", "import"; result: "success", "failed"
    )
    .unwrap()
});

/// Pass duration in seconds.
pub static PASS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mikansync_pass_duration_seconds",
            "Duration of a reconciler pass",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["loop"],
    )
    .unwrap()
});

/// Feed items by outcome.
pub static ANNOUNCEMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mikansync_announcements_total", "Feed items processed"),
        &["result"], // "tagged", "already_tagged", "unmatched", "failed"
    )
    .unwrap()
});

// =============================================================================
// Importer
// =============================================================================

/// Files seen by the importer by outcome.
pub static FILES_IMPORTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mikansync_files_imported_total", "Files seen by the importer"),
        &["result"], // "imported", "duplicate", "skipped", "failed"
    )
    .unwrap()
});

/// Jobs resumed after reporting missing files.
pub static JOBS_RESUMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mikansync_jobs_resumed_total",
        "Jobs resumed from the missing files state",
    )
    .unwrap()
});

// =============================================================================
// External Services
// =============================================================================

/// External service requests.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mikansync_external_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"],
    )
    .unwrap()
});

/// All core metrics, for registration in the server's registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Passes
        Box::new(PASSES_TOTAL.clone()),
        Box::new(PASS_DURATION.clone()),
        Box::new(ANNOUNCEMENTS.clone()),
        // Importer
        Box::new(FILES_IMPORTED.clone()),
        Box::new(JOBS_RESUMED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
