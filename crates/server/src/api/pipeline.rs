//! Pipeline API endpoints: status overview and manual stage triggers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use sitemind_core::store::{PageCounts, WebsiteCounts};
use sitemind_core::{SchedulerError, SchedulerStatus, StageName, StageReport, TenantScope};

use crate::state::AppState;

/// Response for pipeline status endpoint.
#[derive(Debug, Serialize)]
pub struct PipelineStatusResponse {
    /// Whether stages are scheduled in this process.
    pub enabled: bool,
    pub scheduler: SchedulerStatus,
    /// Websites by status, across all tenants.
    pub websites: WebsiteCounts,
    /// Pages by vector status, across all tenants.
    pub pages: PageCounts,
}

/// Response for a manual stage trigger.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub stage: StageName,
    pub report: StageReport,
}

#[derive(Debug, Serialize)]
pub struct PipelineErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<PipelineErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(PipelineErrorResponse {
            error: message.into(),
        }),
    )
}

/// Get scheduler state and store counts
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PipelineStatusResponse>, ApiError> {
    let scope = TenantScope::AllTenants;
    let websites = state
        .store()
        .website_counts(&scope)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let pages = state
        .store()
        .page_counts(&scope)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(PipelineStatusResponse {
        enabled: state.pipeline_enabled(),
        scheduler: state.scheduler().status().await,
        websites,
        pages,
    }))
}

/// Run a stage now, outside its schedule
pub async fn trigger_stage(
    State(state): State<Arc<AppState>>,
    Path(stage): Path<String>,
) -> Result<Json<TriggerResponse>, ApiError> {
    if !state.pipeline_enabled() {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Pipeline is disabled",
        ));
    }

    let name: StageName = stage
        .parse()
        .map_err(|e: String| api_error(StatusCode::NOT_FOUND, e))?;

    match state.scheduler().trigger(name).await {
        Ok(report) => Ok(Json(TriggerResponse {
            stage: name,
            report,
        })),
        Err(e) => {
            warn!(stage = %name, error = %e, "Manual stage trigger failed");
            let status = match e {
                SchedulerError::UnknownStage(_) => StatusCode::NOT_FOUND,
                SchedulerError::AlreadyRunning(_) => StatusCode::CONFLICT,
                SchedulerError::AlreadyRegistered(_) | SchedulerError::StageFailed { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            Err(api_error(status, e.to_string()))
        }
    }
}
