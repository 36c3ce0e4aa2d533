use std::sync::Arc;

use async_trait::async_trait;

use crate::content_service::ContentService;
use crate::metrics;
use crate::store::PipelineStore;

use super::{
    Clock, DiscoveryStage, EnrichStage, IngestStage, PipelineConfig, PipelineError, ScrapeStage,
    StageName, StageReport, SystemClock,
};

/// One recurring unit of pipeline work.
///
/// Stages talk to each other only through persisted row state. A run returns
/// `Err` only when the whole invocation failed (e.g. its selection query);
/// per-item failures are recorded on the item and counted in the report.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self) -> Result<StageReport, PipelineError>;
}

/// Collaborators shared by every stage.
#[derive(Clone)]
pub struct StageContext {
    pub store: Arc<dyn PipelineStore>,
    pub content: Arc<dyn ContentService>,
    pub clock: Arc<dyn Clock>,
    pub config: PipelineConfig,
}

impl StageContext {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        content: Arc<dyn ContentService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            content,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// All four stages in pipeline order.
pub fn build_stages(ctx: &StageContext) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(DiscoveryStage::new(ctx.clone())),
        Arc::new(ScrapeStage::new(ctx.clone())),
        Arc::new(EnrichStage::new(ctx.clone())),
        Arc::new(IngestStage::new(ctx.clone())),
    ]
}

/// Per-item outcome, counted in the report and in metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl StageReport {
    pub(crate) fn record(&mut self, stage: StageName, outcome: ItemOutcome) {
        let label = match outcome {
            ItemOutcome::Succeeded => {
                self.succeeded += 1;
                "succeeded"
            }
            ItemOutcome::Failed => {
                self.failed += 1;
                "failed"
            }
            ItemOutcome::Skipped => {
                self.skipped += 1;
                "skipped"
            }
        };
        metrics::STAGE_ITEMS
            .with_label_values(&[stage.as_str(), label])
            .inc();
    }
}

/// Set a page to `Failed`. A failing update is logged, not propagated.
pub(crate) fn mark_page_failed(store: &dyn PipelineStore, stage: StageName, page_id: &str) {
    if let Err(e) = store.set_page_status(page_id, crate::store::VectorStatus::Failed) {
        tracing::error!(
            stage = %stage,
            page_id,
            error = %e,
            "Failed to update page status to failed"
        );
    }
}
