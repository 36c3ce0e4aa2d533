//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Stage runs (results, durations, per-item outcomes)
//! - Website status transitions
//! - Content service calls and retries

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Stage Metrics
// =============================================================================

/// Stage runs by stage and result.
pub static STAGE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sitemind_stage_runs_total", "Total pipeline stage runs"),
        &["stage", "result"], // "success", "error", "skipped"
    )
    .unwrap()
});

/// Stage run duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sitemind_stage_duration_seconds",
            "Duration of a pipeline stage run",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["stage"],
    )
    .unwrap()
});

/// Items (websites or pages) handled by a stage, by outcome.
pub static STAGE_ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sitemind_stage_items_total",
            "Total items handled by pipeline stages",
        ),
        &["stage", "outcome"], // "succeeded", "failed", "skipped"
    )
    .unwrap()
});

/// Website status transitions by target status.
pub static WEBSITE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sitemind_website_transitions_total",
            "Total website status transitions",
        ),
        &["to"],
    )
    .unwrap()
});

/// Pages created by discovery.
pub static PAGES_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "sitemind_pages_discovered_total",
        "Total pages created by discovery",
    )
    .unwrap()
});

// =============================================================================
// Content Service Metrics
// =============================================================================

/// Content service requests by operation and result.
pub static CONTENT_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sitemind_content_service_requests_total",
            "Total content service requests",
        ),
        &["operation", "result"], // "success", "error"
    )
    .unwrap()
});

/// Content service request duration, retries included.
pub static CONTENT_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sitemind_content_service_duration_seconds",
            "Duration of content service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
    )
    .unwrap()
});

/// Retries of content service calls after transient failures.
pub static CONTENT_SERVICE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sitemind_content_service_retries_total",
            "Total content service retries",
        ),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Stages
        Box::new(STAGE_RUNS.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGE_ITEMS.clone()),
        Box::new(WEBSITE_TRANSITIONS.clone()),
        Box::new(PAGES_DISCOVERED.clone()),
        // Content service
        Box::new(CONTENT_SERVICE_REQUESTS.clone()),
        Box::new(CONTENT_SERVICE_DURATION.clone()),
        Box::new(CONTENT_SERVICE_RETRIES.clone()),
    ]
}
