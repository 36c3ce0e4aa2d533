//! Website and page records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Crawl status of a website. Drives discovery eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebsiteStatus {
    /// Registered, never crawled.
    Created,
    /// Discovery ran; pages are moving through the pipeline.
    Crawling,
    /// Every page reached a terminal vector status.
    Active,
    /// Discovery failed or returned nothing.
    Error,
}

impl WebsiteStatus {
    pub const ALL: [WebsiteStatus; 4] = [
        WebsiteStatus::Created,
        WebsiteStatus::Crawling,
        WebsiteStatus::Active,
        WebsiteStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebsiteStatus::Created => "created",
            WebsiteStatus::Crawling => "crawling",
            WebsiteStatus::Active => "active",
            WebsiteStatus::Error => "error",
        }
    }
}

impl fmt::Display for WebsiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebsiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(WebsiteStatus::Created),
            "crawling" => Ok(WebsiteStatus::Crawling),
            "active" => Ok(WebsiteStatus::Active),
            "error" => Ok(WebsiteStatus::Error),
            other => Err(format!("unknown website status: {}", other)),
        }
    }
}

/// Vector-ingestion status of a page.
///
/// `Processing` covers both "being scraped" and "awaiting enrichment or
/// ingestion"; [`PageSelector`] tells those apart by content presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VectorStatus {
    pub const ALL: [VectorStatus; 4] = [
        VectorStatus::Pending,
        VectorStatus::Processing,
        VectorStatus::Completed,
        VectorStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStatus::Pending => "pending",
            VectorStatus::Processing => "processing",
            VectorStatus::Completed => "completed",
            VectorStatus::Failed => "failed",
        }
    }

    /// Completed and Failed end a page's round.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VectorStatus::Completed | VectorStatus::Failed)
    }
}

impl fmt::Display for VectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VectorStatus::Pending),
            "processing" => Ok(VectorStatus::Processing),
            "completed" => Ok(VectorStatus::Completed),
            "failed" => Ok(VectorStatus::Failed),
            other => Err(format!("unknown vector status: {}", other)),
        }
    }
}

/// A tenant-owned website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Website {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub base_url: String,
    pub status: WebsiteStatus,
    /// Last discovery attempt or completed round. Used for retry windows.
    pub last_crawled_at: Option<DateTime<Utc>>,
    /// Lease marker. Non-null and younger than the lease timeout means held.
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Website {
    /// Whether the lease is held by someone at `now`.
    pub fn lease_held(&self, now: DateTime<Utc>, lease_timeout: Duration) -> bool {
        self.processing_started_at
            .is_some_and(|started| started > now - lease_timeout)
    }

    /// Whether discovery may pick the website up at `now`.
    ///
    /// Same predicate as the candidate query, evaluated on a single row.
    pub fn awaits_discovery(&self, now: DateTime<Utc>, policy: &DiscoveryPolicy) -> bool {
        let older_than = |window: Duration| {
            self.last_crawled_at
                .map_or(true, |crawled| crawled < now - window)
        };
        let eligible = match self.status {
            WebsiteStatus::Created => true,
            WebsiteStatus::Error => older_than(policy.error_retry_after),
            WebsiteStatus::Crawling => older_than(policy.stuck_crawl_after),
            WebsiteStatus::Active => false,
        };
        eligible && !self.lease_held(now, policy.lease_timeout)
    }
}

/// A page discovered under a website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub organization_id: String,
    pub website_id: String,
    pub url: String,
    pub raw_content: Option<String>,
    pub markdown_content: Option<String>,
    pub summary: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub vector_status: VectorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a website for the current tenant.
#[derive(Debug, Clone)]
pub struct CreateWebsiteRequest {
    pub name: String,
    pub base_url: String,
}

/// Filter for listing websites.
#[derive(Debug, Clone)]
pub struct WebsiteFilter {
    pub status: Option<WebsiteStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for WebsiteFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl WebsiteFilter {
    pub fn with_status(mut self, status: WebsiteStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Filter for listing pages.
#[derive(Debug, Clone)]
pub struct PageFilter {
    pub website_id: Option<String>,
    pub vector_status: Option<VectorStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PageFilter {
    fn default() -> Self {
        Self {
            website_id: None,
            vector_status: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl PageFilter {
    pub fn for_website(website_id: impl Into<String>) -> Self {
        Self {
            website_id: Some(website_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: VectorStatus) -> Self {
        self.vector_status = Some(status);
        self
    }
}

/// Time windows deciding which websites discovery picks up.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryPolicy {
    /// How long an `Error` website waits before being retried.
    pub error_retry_after: Duration,
    /// How long a `Crawling` website may sit before being reclaimed.
    pub stuck_crawl_after: Duration,
    /// Age after which a lease no longer blocks.
    pub lease_timeout: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            error_retry_after: Duration::hours(1),
            stuck_crawl_after: Duration::minutes(30),
            lease_timeout: Duration::minutes(30),
        }
    }
}

/// Page selection used by the scrape, enrich and ingest stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    /// Pending with no raw content.
    AwaitingScrape,
    /// Processing with raw content and no markdown.
    AwaitingEnrichment,
    /// Processing with markdown.
    AwaitingIngest,
}

/// Output of the enrich stage for one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Enrichment {
    pub markdown_content: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
}

/// Per-website page outcome counts used by the aggregation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PageProgress {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

impl PageProgress {
    /// At least one page and all of them terminal.
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed + self.failed == self.total
    }
}

/// Website counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WebsiteCounts {
    pub created: u64,
    pub crawling: u64,
    pub active: u64,
    pub error: u64,
}

impl WebsiteCounts {
    pub fn get(&self, status: WebsiteStatus) -> u64 {
        match status {
            WebsiteStatus::Created => self.created,
            WebsiteStatus::Crawling => self.crawling,
            WebsiteStatus::Active => self.active,
            WebsiteStatus::Error => self.error,
        }
    }

    pub(crate) fn set(&mut self, status: WebsiteStatus, count: u64) {
        match status {
            WebsiteStatus::Created => self.created = count,
            WebsiteStatus::Crawling => self.crawling = count,
            WebsiteStatus::Active => self.active = count,
            WebsiteStatus::Error => self.error = count,
        }
    }
}

/// Page counts by vector status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PageCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl PageCounts {
    pub fn get(&self, status: VectorStatus) -> u64 {
        match status {
            VectorStatus::Pending => self.pending,
            VectorStatus::Processing => self.processing,
            VectorStatus::Completed => self.completed,
            VectorStatus::Failed => self.failed,
        }
    }

    pub(crate) fn set(&mut self, status: VectorStatus, count: u64) {
        match status {
            VectorStatus::Pending => self.pending = count,
            VectorStatus::Processing => self.processing = count,
            VectorStatus::Completed => self.completed = count,
            VectorStatus::Failed => self.failed = count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in WebsiteStatus::ALL {
            assert_eq!(status.as_str().parse::<WebsiteStatus>().unwrap(), status);
        }
        for status in VectorStatus::ALL {
            assert_eq!(status.as_str().parse::<VectorStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<WebsiteStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&VectorStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_lease_held() {
        let now = Utc::now();
        let mut website = Website {
            id: "w1".to_string(),
            organization_id: "org".to_string(),
            name: "Example".to_string(),
            base_url: "http://x.test".to_string(),
            status: WebsiteStatus::Crawling,
            last_crawled_at: None,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        };
        let timeout = Duration::minutes(30);
        assert!(!website.lease_held(now, timeout));

        website.processing_started_at = Some(now - Duration::minutes(5));
        assert!(website.lease_held(now, timeout));

        website.processing_started_at = Some(now - Duration::minutes(31));
        assert!(!website.lease_held(now, timeout));
    }

    #[test]
    fn test_awaits_discovery() {
        let now = Utc::now();
        let policy = DiscoveryPolicy::default();
        let mut website = Website {
            id: "w1".to_string(),
            organization_id: "org".to_string(),
            name: "Example".to_string(),
            base_url: "http://x.test".to_string(),
            status: WebsiteStatus::Created,
            last_crawled_at: None,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(website.awaits_discovery(now, &policy));

        website.status = WebsiteStatus::Error;
        website.last_crawled_at = Some(now - Duration::minutes(59));
        assert!(!website.awaits_discovery(now, &policy));
        website.last_crawled_at = Some(now - Duration::minutes(61));
        assert!(website.awaits_discovery(now, &policy));

        website.status = WebsiteStatus::Crawling;
        website.last_crawled_at = Some(now - Duration::minutes(10));
        assert!(!website.awaits_discovery(now, &policy));
        website.last_crawled_at = Some(now - Duration::minutes(31));
        assert!(website.awaits_discovery(now, &policy));

        // Eligible status but a fresh lease
        website.processing_started_at = Some(now - Duration::minutes(1));
        assert!(!website.awaits_discovery(now, &policy));

        website.status = WebsiteStatus::Active;
        website.processing_started_at = None;
        assert!(!website.awaits_discovery(now, &policy));
    }

    #[test]
    fn test_page_progress_finished() {
        assert!(!PageProgress::default().is_finished());
        assert!(PageProgress {
            total: 3,
            completed: 2,
            failed: 1
        }
        .is_finished());
        assert!(!PageProgress {
            total: 3,
            completed: 1,
            failed: 1
        }
        .is_finished());
    }
}
