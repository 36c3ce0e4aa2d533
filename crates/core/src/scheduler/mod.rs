//! Recurring, non-reentrant execution of pipeline stages.

mod runner;
mod types;

pub use runner::PipelineScheduler;
pub use types::{LastRun, SchedulerError, SchedulerStatus, StageStatus};
