use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use thiserror::Error;

use super::{
    CreateWebsiteRequest, DiscoveryPolicy, Enrichment, Page, PageCounts, PageFilter,
    PageProgress, PageSelector, TenantScope, VectorStatus, Website, WebsiteCounts, WebsiteFilter,
};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("operation requires a tenant scope")]
    TenantRequired,

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn website_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "website",
            id: id.to_string(),
        }
    }

    pub fn page_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "page",
            id: id.to_string(),
        }
    }
}

/// Persistence for websites and pages.
///
/// Queries take an explicit [`TenantScope`]. Mutations keyed by a row id the
/// caller already selected are unscoped.
pub trait PipelineStore: Send + Sync {
    // Websites

    /// Register a website for the scoped tenant. New websites start `Created`.
    fn create_website(
        &self,
        scope: &TenantScope,
        request: CreateWebsiteRequest,
    ) -> Result<Website, StoreError>;

    fn get_website(&self, scope: &TenantScope, id: &str) -> Result<Option<Website>, StoreError>;

    fn list_websites(
        &self,
        scope: &TenantScope,
        filter: &WebsiteFilter,
    ) -> Result<Vec<Website>, StoreError>;

    /// Websites eligible for discovery at `now`, oldest-created first.
    fn find_discovery_candidates(
        &self,
        scope: &TenantScope,
        policy: &DiscoveryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<Website>, StoreError>;

    /// Transactionally re-check the discovery predicate and take the lease.
    ///
    /// Returns `None` when the website no longer qualifies: another holder
    /// has an unexpired lease, or it was crawled since the candidate list was
    /// read. On success the website is `Crawling` with `last_crawled_at` and
    /// the lease set to `now`.
    fn try_acquire_lease(
        &self,
        id: &str,
        now: DateTime<Utc>,
        policy: &DiscoveryPolicy,
    ) -> Result<Option<Website>, StoreError>;

    fn release_lease(&self, id: &str) -> Result<(), StoreError>;

    /// Set `Error` and refresh `last_crawled_at`.
    fn mark_website_error(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Set `Active` and refresh `last_crawled_at` if the website is still
    /// `Crawling` and not leased. Returns whether the row changed.
    fn mark_website_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<bool, StoreError>;

    fn website_counts(&self, scope: &TenantScope) -> Result<WebsiteCounts, StoreError>;

    // Pages

    fn existing_page_urls(&self, website_id: &str) -> Result<HashSet<String>, StoreError>;

    /// Insert `Pending` pages, ignoring URLs already stored for the website.
    /// Returns the number of rows created.
    fn insert_pages(&self, website: &Website, urls: &[String]) -> Result<usize, StoreError>;

    fn get_page(&self, scope: &TenantScope, id: &str) -> Result<Option<Page>, StoreError>;

    fn list_pages(&self, scope: &TenantScope, filter: &PageFilter)
        -> Result<Vec<Page>, StoreError>;

    /// Oldest pages matching `selector`, at most `limit`.
    fn select_pages(
        &self,
        scope: &TenantScope,
        selector: PageSelector,
        limit: usize,
    ) -> Result<Vec<Page>, StoreError>;

    fn set_page_status(&self, id: &str, status: VectorStatus) -> Result<(), StoreError>;

    fn store_raw_content(&self, id: &str, content: &str) -> Result<(), StoreError>;

    /// Store markdown, summary and keywords. Status is left unchanged.
    fn store_enrichment(&self, id: &str, enrichment: &Enrichment) -> Result<(), StoreError>;

    fn page_progress(&self, website_id: &str) -> Result<PageProgress, StoreError>;

    fn page_counts(&self, scope: &TenantScope) -> Result<PageCounts, StoreError>;
}
