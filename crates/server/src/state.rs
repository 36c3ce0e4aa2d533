use std::sync::Arc;

use sitemind_core::{Config, PipelineScheduler, PipelineStore, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn PipelineStore>,
    scheduler: Arc<PipelineScheduler>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PipelineStore>,
        scheduler: Arc<PipelineScheduler>,
    ) -> Self {
        Self {
            config,
            store,
            scheduler,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Whether the pipeline stages are scheduled in this process.
    pub fn pipeline_enabled(&self) -> bool {
        self.config.pipeline.enabled
    }

    pub fn store(&self) -> &dyn PipelineStore {
        self.store.as_ref()
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }
}
