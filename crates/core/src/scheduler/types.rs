//! Types for the pipeline scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{StageName, StageReport};

/// Errors that can occur while scheduling stages.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A stage with this name is already registered.
    #[error("stage already registered: {0}")]
    AlreadyRegistered(StageName),

    /// No stage with this name is registered.
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// The stage is still running from a previous tick or trigger.
    #[error("stage already running: {0}")]
    AlreadyRunning(StageName),

    /// Every attempt of a stage run failed.
    #[error("stage {stage} failed after {attempts} attempt(s): {message}")]
    StageFailed {
        stage: StageName,
        attempts: u32,
        message: String,
    },
}

/// Outcome of the most recent run of a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub report: Option<StageReport>,
    pub error: Option<String>,
}

/// Scheduling state of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub name: StageName,
    pub interval_secs: u64,
    pub in_flight: bool,
    /// Completed runs, successful or not.
    pub runs: u64,
    pub failures: u64,
    pub last_run: Option<LastRun>,
}

/// Current status of the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub stages: Vec<StageStatus>,
}
