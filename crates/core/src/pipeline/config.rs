//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::store::DiscoveryPolicy;

use super::StageName;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Enable/disable the scheduler.
    /// When disabled, no stage runs on its own and manual triggers are refused.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Age after which a website lease stops blocking other runners (seconds).
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u64,

    /// How long a website in `error` waits before discovery retries it (seconds).
    #[serde(default = "default_error_retry_after")]
    pub error_retry_after_secs: u64,

    /// How long a website may stay `crawling` before discovery reclaims it (seconds).
    #[serde(default = "default_stuck_crawl_after")]
    pub stuck_crawl_after_secs: u64,

    /// Pages handled per scrape/enrich/ingest run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between two scrape requests (milliseconds).
    #[serde(default = "default_scrape_delay")]
    pub scrape_delay_ms: u64,

    /// Attempts per stage invocation before it is reported failed.
    #[serde(default = "default_job_attempts")]
    pub job_attempts: u32,

    /// Pause between two attempts of a failed stage invocation (milliseconds).
    #[serde(default = "default_job_retry_delay")]
    pub job_retry_delay_ms: u64,

    /// Per-stage schedule.
    #[serde(default)]
    pub stages: StageSchedules,
}

fn default_enabled() -> bool {
    true
}

fn default_lease_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_error_retry_after() -> u64 {
    3600 // 1 hour
}

fn default_stuck_crawl_after() -> u64 {
    1800 // 30 minutes
}

fn default_batch_size() -> usize {
    10
}

fn default_scrape_delay() -> u64 {
    5000 // 5 seconds
}

fn default_job_attempts() -> u32 {
    3
}

fn default_job_retry_delay() -> u64 {
    10_000 // 10 seconds
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            lease_timeout_secs: default_lease_timeout(),
            error_retry_after_secs: default_error_retry_after(),
            stuck_crawl_after_secs: default_stuck_crawl_after(),
            batch_size: default_batch_size(),
            scrape_delay_ms: default_scrape_delay(),
            job_attempts: default_job_attempts(),
            job_retry_delay_ms: default_job_retry_delay(),
            stages: StageSchedules::default(),
        }
    }
}

impl PipelineConfig {
    pub fn lease_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_timeout_secs as i64)
    }

    /// Discovery eligibility windows.
    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        DiscoveryPolicy {
            error_retry_after: chrono::Duration::seconds(self.error_retry_after_secs as i64),
            stuck_crawl_after: chrono::Duration::seconds(self.stuck_crawl_after_secs as i64),
            lease_timeout: self.lease_timeout(),
        }
    }

    pub fn scrape_delay(&self) -> Duration {
        Duration::from_millis(self.scrape_delay_ms)
    }

    pub fn job_retry_delay(&self) -> Duration {
        Duration::from_millis(self.job_retry_delay_ms)
    }
}

/// When a stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSchedule {
    /// Seconds between two runs.
    pub interval_secs: u64,
    /// Whether the stage is scheduled at all.
    pub enabled: bool,
}

impl StageSchedule {
    fn every(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            enabled: true,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Schedules of the four stages. Omitted keys keep the stage's own default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StageSchedulesToml")]
pub struct StageSchedules {
    pub discovery: StageSchedule,
    pub scrape: StageSchedule,
    pub enrich: StageSchedule,
    pub ingest: StageSchedule,
}

impl Default for StageSchedules {
    fn default() -> Self {
        Self {
            discovery: StageSchedule::every(600),
            scrape: StageSchedule::every(60),
            enrich: StageSchedule::every(60),
            ingest: StageSchedule::every(60),
        }
    }
}

impl StageSchedules {
    pub fn get(&self, stage: StageName) -> &StageSchedule {
        match stage {
            StageName::Discovery => &self.discovery,
            StageName::Scrape => &self.scrape,
            StageName::Enrich => &self.enrich,
            StageName::Ingest => &self.ingest,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageName, &StageSchedule)> {
        StageName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StageSchedulesToml {
    discovery: PartialSchedule,
    scrape: PartialSchedule,
    enrich: PartialSchedule,
    ingest: PartialSchedule,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PartialSchedule {
    interval_secs: Option<u64>,
    enabled: Option<bool>,
}

impl PartialSchedule {
    fn or(self, fallback: StageSchedule) -> StageSchedule {
        StageSchedule {
            interval_secs: self.interval_secs.unwrap_or(fallback.interval_secs),
            enabled: self.enabled.unwrap_or(fallback.enabled),
        }
    }
}

impl From<StageSchedulesToml> for StageSchedules {
    fn from(raw: StageSchedulesToml) -> Self {
        let defaults = StageSchedules::default();
        Self {
            discovery: raw.discovery.or(defaults.discovery),
            scrape: raw.scrape.or(defaults.scrape),
            enrich: raw.enrich.or(defaults.enrich),
            ingest: raw.ingest.or(defaults.ingest),
        }
    }
}
