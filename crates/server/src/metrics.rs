//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the SiteMind server:
//! - HTTP request metrics (latency, counts)
//! - Website and page counts by status (collected dynamically)
//! - Scheduler state (collected dynamically)
//!
//! Stage and content service metrics live in `sitemind_core::metrics` and
//! are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use sitemind_core::store::{VectorStatus, WebsiteStatus};
use sitemind_core::TenantScope;
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
            "sitemind_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sitemind_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "sitemind_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Store Metrics (collected dynamically)
// =============================================================================

/// Websites by current status.
pub static WEBSITES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("sitemind_websites_by_status", "Current website count by status"),
        &["status"],
    )
    .unwrap()
});

/// Pages by current vector status.
pub static PAGES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "sitemind_pages_by_status",
            "Current page count by vector status",
        ),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics (collected dynamically)
// =============================================================================

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "sitemind_scheduler_running",
        "Whether the pipeline scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Stages with a run in progress.
pub static STAGE_IN_FLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "sitemind_stage_in_flight",
            "Whether a stage run is in progress (1) or not (0)",
        ),
        &["stage"],
    )
    .unwrap()
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

    // Store
    registry
        .register(Box::new(WEBSITES_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(PAGES_BY_STATUS.clone()))
        .unwrap();

    // Scheduler
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(STAGE_IN_FLIGHT.clone()))
        .unwrap();

    // Core metrics (stages, content service)
    for metric in sitemind_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the store and scheduler
/// at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.scheduler().status().await;
    SCHEDULER_RUNNING.set(if status.running { 1 } else { 0 });
    for stage in &status.stages {
        STAGE_IN_FLIGHT
            .with_label_values(&[stage.name.as_str()])
            .set(if stage.in_flight { 1 } else { 0 });
    }

    match state.store().website_counts(&TenantScope::AllTenants) {
        Ok(counts) => {
            for website_status in WebsiteStatus::ALL {
                WEBSITES_BY_STATUS
                    .with_label_values(&[website_status.as_str()])
                    .set(counts.get(website_status) as i64);
            }
        }
        Err(e) => warn!(error = %e, "Failed to count websites for metrics"),
    }

    match state.store().page_counts(&TenantScope::AllTenants) {
        Ok(counts) => {
            for vector_status in VectorStatus::ALL {
                PAGES_BY_STATUS
                    .with_label_values(&[vector_status.as_str()])
                    .set(counts.get(vector_status) as i64);
            }
        }
        Err(e) => warn!(error = %e, "Failed to count pages for metrics"),
    }
}
