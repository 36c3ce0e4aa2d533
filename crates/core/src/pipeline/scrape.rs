//! Scrape stage: fetches raw content for pending pages.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::store::{Page, PageSelector, TenantScope, VectorStatus};

use super::stage::{mark_page_failed, ItemOutcome};
use super::{PipelineError, Stage, StageContext, StageName, StageReport};

pub struct ScrapeStage {
    ctx: StageContext,
}

impl ScrapeStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    async fn scrape_page(&self, page: &Page) -> Result<usize, PipelineError> {
        // Persisted before the call so a crash never leaves the page selectable as pending.
        self.ctx
            .store
            .set_page_status(&page.id, VectorStatus::Processing)?;

        let response = self.ctx.content.scrape_url(&page.url).await?;
        let content = response
            .as_ref()
            .and_then(|r| r.best_content())
            .ok_or(PipelineError::EmptyResponse("scrape-url"))?;

        self.ctx.store.store_raw_content(&page.id, content)?;
        Ok(content.len())
    }
}

#[async_trait]
impl Stage for ScrapeStage {
    fn name(&self) -> StageName {
        StageName::Scrape
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let pages = self.ctx.store.select_pages(
            &TenantScope::AllTenants,
            PageSelector::AwaitingScrape,
            self.ctx.config.batch_size,
        )?;

        let mut report = StageReport::default();
        if pages.is_empty() {
            debug!("No pages need scraping");
            return Ok(report);
        }

        info!(count = pages.len(), "Found pages needing scraping");

        for (i, page) in pages.iter().enumerate() {
            // Pacing between requests, failed pages included
            if i > 0 {
                tokio::time::sleep(self.ctx.config.scrape_delay()).await;
            }
            report.selected += 1;

            debug!(page_id = %page.id, website_id = %page.website_id, url = %page.url, "Scraping page");
            match self.scrape_page(page).await {
                Ok(length) => {
                    debug!(page_id = %page.id, length, "Scraped page");
                    report.record(self.name(), ItemOutcome::Succeeded);
                }
                Err(e) => {
                    warn!(page_id = %page.id, url = %page.url, error = %e, "Scraping failed");
                    mark_page_failed(self.ctx.store.as_ref(), self.name(), &page.id);
                    report.record(self.name(), ItemOutcome::Failed);
                }
            }
        }

        info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            "Scrape run completed"
        );
        Ok(report)
    }
}
