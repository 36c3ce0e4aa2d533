//! Discovery stage: finds websites to crawl and materializes their pages.
//!
//! Each website is processed under a lease (`processing_started_at`) so that
//! concurrent runners never crawl the same website twice. The lease is
//! released by [`LeaseGuard`] whatever happens to the crawl.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::store::{PipelineStore, TenantScope, Website, WebsiteStatus};

use super::stage::ItemOutcome;
use super::{PipelineError, Stage, StageContext, StageName, StageReport};

pub struct DiscoveryStage {
    ctx: StageContext,
}

impl DiscoveryStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    /// Discover URLs for a leased website and insert the new ones.
    async fn crawl(&self, website: &Website) -> Result<usize, PipelineError> {
        let discovered = self.ctx.content.discover_urls(&website.base_url).await?;

        let urls: Vec<String> = discovered
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(PipelineError::EmptyDiscovery);
        }

        let existing = self.ctx.store.existing_page_urls(&website.id)?;
        let mut seen = HashSet::new();
        let new_urls: Vec<String> = urls
            .iter()
            .filter(|url| !existing.contains(*url) && seen.insert(url.as_str()))
            .cloned()
            .collect();

        let inserted = self.ctx.store.insert_pages(website, &new_urls)?;
        metrics::PAGES_DISCOVERED.inc_by(inserted as u64);

        info!(
            website_id = %website.id,
            organization_id = %website.organization_id,
            discovered = urls.len(),
            inserted,
            "URL discovery finished"
        );
        Ok(inserted)
    }

    fn mark_error(&self, website: &Website) {
        match self
            .ctx
            .store
            .mark_website_error(&website.id, self.ctx.clock.now())
        {
            Ok(()) => {
                metrics::WEBSITE_TRANSITIONS
                    .with_label_values(&[WebsiteStatus::Error.as_str()])
                    .inc();
            }
            Err(e) => {
                error!(website_id = %website.id, error = %e, "Failed to mark website as error");
            }
        }
    }
}

#[async_trait]
impl Stage for DiscoveryStage {
    fn name(&self) -> StageName {
        StageName::Discovery
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let policy = self.ctx.config.discovery_policy();
        let candidates = self.ctx.store.find_discovery_candidates(
            &TenantScope::AllTenants,
            &policy,
            self.ctx.clock.now(),
        )?;

        let mut report = StageReport::default();
        if candidates.is_empty() {
            debug!("No websites need URL discovery");
            return Ok(report);
        }

        info!(count = candidates.len(), "Found websites needing URL discovery");

        for candidate in candidates {
            report.selected += 1;

            let leased = match self.ctx.store.try_acquire_lease(
                &candidate.id,
                self.ctx.clock.now(),
                &policy,
            ) {
                Ok(Some(website)) => website,
                Ok(None) => {
                    info!(website_id = %candidate.id, "Website taken or crawled by another runner, skipping");
                    report.record(self.name(), ItemOutcome::Skipped);
                    continue;
                }
                Err(e) => {
                    error!(website_id = %candidate.id, error = %e, "Failed to acquire website lease");
                    report.record(self.name(), ItemOutcome::Failed);
                    continue;
                }
            };

            metrics::WEBSITE_TRANSITIONS
                .with_label_values(&[WebsiteStatus::Crawling.as_str()])
                .inc();
            let _lease = LeaseGuard::new(Arc::clone(&self.ctx.store), &leased.id);

            info!(
                website_id = %leased.id,
                organization_id = %leased.organization_id,
                base_url = %leased.base_url,
                "Discovering URLs"
            );

            match self.crawl(&leased).await {
                Ok(_) => report.record(self.name(), ItemOutcome::Succeeded),
                Err(PipelineError::EmptyDiscovery) => {
                    warn!(website_id = %leased.id, "Discovery returned no URLs");
                    self.mark_error(&leased);
                    report.record(self.name(), ItemOutcome::Failed);
                }
                Err(e) => {
                    error!(website_id = %leased.id, error = %e, "URL discovery failed");
                    self.mark_error(&leased);
                    report.record(self.name(), ItemOutcome::Failed);
                }
            }
        }

        info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Discovery run completed"
        );
        Ok(report)
    }
}

/// Clears a website lease when dropped.
///
/// Covers success, failure, panics and cancellation of the owning future.
/// Release failures are logged and never propagated.
struct LeaseGuard {
    store: Arc<dyn PipelineStore>,
    website_id: String,
}

impl LeaseGuard {
    fn new(store: Arc<dyn PipelineStore>, website_id: &str) -> Self {
        Self {
            store,
            website_id: website_id.to_string(),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        match self.store.release_lease(&self.website_id) {
            Ok(()) => debug!(website_id = %self.website_id, "Released website lease"),
            Err(e) => {
                error!(website_id = %self.website_id, error = %e, "Failed to release website lease")
            }
        }
    }
}
