//! Ingest stage: pushes enriched pages into the vector store, then rolls
//! page outcomes up into website status.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::content_service::{IngestMetadata, IngestRequest};
use crate::metrics;
use crate::store::{
    Page, PageSelector, TenantScope, VectorStatus, WebsiteFilter, WebsiteStatus,
};

use super::stage::{mark_page_failed, ItemOutcome};
use super::{PipelineError, Stage, StageContext, StageName, StageReport};

pub struct IngestStage {
    ctx: StageContext,
}

impl IngestStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    fn build_request(page: &Page) -> IngestRequest {
        IngestRequest {
            tenant_id: page.organization_id.clone(),
            url: page.url.clone(),
            metadata: IngestMetadata {
                summary: page.summary.clone().filter(|s| !s.is_empty()),
                keywords: page.keywords.clone().unwrap_or_default(),
                source_url: page.url.clone(),
            },
            markdown_content: page.markdown_content.clone().unwrap_or_default(),
        }
    }

    async fn ingest_page(&self, page: &Page) -> Result<(), PipelineError> {
        let response = self
            .ctx
            .content
            .ingest(&Self::build_request(page))
            .await?
            .ok_or(PipelineError::EmptyResponse("ingest-rag"))?;

        if !response.success {
            return Err(PipelineError::Unsuccessful(
                response
                    .message
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        self.ctx
            .store
            .set_page_status(&page.id, VectorStatus::Completed)?;
        Ok(())
    }

    /// Mark `Crawling` websites whose pages all reached a terminal status as
    /// `Active`. Websites without pages are left alone. Returns how many changed.
    pub fn sweep_websites(&self) -> Result<usize, PipelineError> {
        let filter = WebsiteFilter {
            status: Some(WebsiteStatus::Crawling),
            limit: i64::MAX,
            offset: 0,
        };
        let crawling = self
            .ctx
            .store
            .list_websites(&TenantScope::AllTenants, &filter)?;
        let lease_timeout = self.ctx.config.lease_timeout();

        let mut activated = 0;
        for website in crawling {
            let progress = self.ctx.store.page_progress(&website.id)?;
            if !progress.is_finished() {
                continue;
            }

            if self.ctx.store.mark_website_active(
                &website.id,
                self.ctx.clock.now(),
                lease_timeout,
            )? {
                info!(
                    website_id = %website.id,
                    organization_id = %website.organization_id,
                    pages = progress.total,
                    completed = progress.completed,
                    failed = progress.failed,
                    "Website ingestion round finished"
                );
                metrics::WEBSITE_TRANSITIONS
                    .with_label_values(&[WebsiteStatus::Active.as_str()])
                    .inc();
                activated += 1;
            }
        }
        Ok(activated)
    }
}

#[async_trait]
impl Stage for IngestStage {
    fn name(&self) -> StageName {
        StageName::Ingest
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let pages = self.ctx.store.select_pages(
            &TenantScope::AllTenants,
            PageSelector::AwaitingIngest,
            self.ctx.config.batch_size,
        )?;

        let mut report = StageReport::default();
        if pages.is_empty() {
            debug!("No pages need ingestion");
        } else {
            info!(count = pages.len(), "Found pages needing ingestion");
        }

        for page in &pages {
            report.selected += 1;
            match self.ingest_page(page).await {
                Ok(()) => {
                    debug!(page_id = %page.id, url = %page.url, "Ingested page");
                    report.record(self.name(), ItemOutcome::Succeeded);
                }
                Err(e) => {
                    warn!(page_id = %page.id, website_id = %page.website_id, error = %e, "Ingestion failed");
                    mark_page_failed(self.ctx.store.as_ref(), self.name(), &page.id);
                    report.record(self.name(), ItemOutcome::Failed);
                }
            }
        }

        // Runs on empty batches too: pages may have failed in earlier stages.
        match self.sweep_websites() {
            Ok(0) => {}
            Ok(activated) => info!(activated, "Websites marked active"),
            Err(e) => error!(error = %e, "Website status sweep failed"),
        }

        if !report.is_empty() {
            info!(
                selected = report.selected,
                succeeded = report.succeeded,
                failed = report.failed,
                "Ingest run completed"
            );
        }
        Ok(report)
    }
}
