//! Types shared by the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::content_service::ContentServiceError;
use crate::store::StoreError;

/// The four recurring jobs of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageName {
    #[serde(rename = "fetch-urls")]
    Discovery,
    #[serde(rename = "scrape-pages")]
    Scrape,
    #[serde(rename = "process-pages")]
    Enrich,
    #[serde(rename = "ingest-pages")]
    Ingest,
}

impl StageName {
    pub const ALL: [StageName; 4] = [
        StageName::Discovery,
        StageName::Scrape,
        StageName::Enrich,
        StageName::Ingest,
    ];

    /// Job id used for scheduling, logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Discovery => "fetch-urls",
            StageName::Scrape => "scrape-pages",
            StageName::Enrich => "process-pages",
            StageName::Ingest => "ingest-pages",
        }
    }

    /// Key of the stage under `[pipeline.stages]`.
    pub fn config_key(&self) -> &'static str {
        match self {
            StageName::Discovery => "discovery",
            StageName::Scrape => "scrape",
            StageName::Enrich => "enrich",
            StageName::Ingest => "ingest",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    /// Accepts the job id or the config key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .into_iter()
            .find(|name| name.as_str() == s || name.config_key() == s)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// Outcome counts of one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Items picked up by the selection query.
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items left alone, e.g. a website leased by another runner.
    pub skipped: usize,
}

impl StageReport {
    pub fn is_empty(&self) -> bool {
        self.selected == 0
    }
}

/// Errors raised while processing a stage or one of its items.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("content service error: {0}")]
    ContentService(#[from] ContentServiceError),

    /// Discovery returned no usable URL.
    #[error("discovery returned no URLs")]
    EmptyDiscovery,

    /// The service answered without the expected content.
    #[error("empty response from {0}")]
    EmptyResponse(&'static str),

    /// The service reported failure.
    #[error("unsuccessful response: {0}")]
    Unsuccessful(String),
}
