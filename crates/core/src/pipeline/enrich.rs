//! Enrich stage: turns raw content into markdown, summary and keywords.
//!
//! The page stays `Processing`; the ingest stage picks it up once markdown is present.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::store::{Enrichment, Page, PageSelector, TenantScope};

use super::stage::{mark_page_failed, ItemOutcome};
use super::{PipelineError, Stage, StageContext, StageName, StageReport};

pub struct EnrichStage {
    ctx: StageContext,
}

impl EnrichStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    async fn enrich_page(&self, page: &Page) -> Result<(), PipelineError> {
        let raw = page.raw_content.as_deref().unwrap_or_default();
        let response = self
            .ctx
            .content
            .process_content(raw)
            .await?
            .ok_or(PipelineError::EmptyResponse("process-content"))?;

        // Empty markdown would make the page selectable here forever.
        let markdown_content = response
            .markdown_content
            .filter(|md| !md.trim().is_empty())
            .ok_or(PipelineError::EmptyResponse("process-content"))?;

        let enrichment = Enrichment {
            markdown_content,
            summary: response.metadata.summary.filter(|s| !s.trim().is_empty()),
            keywords: response.metadata.keywords,
        };
        self.ctx.store.store_enrichment(&page.id, &enrichment)?;

        debug!(
            page_id = %page.id,
            markdown_length = enrichment.markdown_content.len(),
            keywords = enrichment.keywords.len(),
            "Enriched page"
        );
        Ok(())
    }
}

#[async_trait]
impl Stage for EnrichStage {
    fn name(&self) -> StageName {
        StageName::Enrich
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let pages = self.ctx.store.select_pages(
            &TenantScope::AllTenants,
            PageSelector::AwaitingEnrichment,
            self.ctx.config.batch_size,
        )?;

        let mut report = StageReport::default();
        if pages.is_empty() {
            debug!("No pages need enrichment");
            return Ok(report);
        }

        info!(count = pages.len(), "Found pages needing enrichment");

        for page in &pages {
            report.selected += 1;
            match self.enrich_page(page).await {
                Ok(()) => report.record(self.name(), ItemOutcome::Succeeded),
                Err(e) => {
                    warn!(page_id = %page.id, website_id = %page.website_id, error = %e, "Enrichment failed");
                    mark_page_failed(self.ctx.store.as_ref(), self.name(), &page.id);
                    report.record(self.name(), ItemOutcome::Failed);
                }
            }
        }

        info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            "Enrich run completed"
        );
        Ok(report)
    }
}
