pub mod config;
pub mod content_service;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError,
    ContentServiceConfig, SanitizedConfig,
};
pub use content_service::{ContentService, ContentServiceError, WebhookContentService};
pub use pipeline::{
    build_stages, Clock, PipelineConfig, PipelineError, Stage, StageContext, StageName,
    StageReport, SystemClock,
};
pub use scheduler::{PipelineScheduler, SchedulerError, SchedulerStatus};
pub use store::{PipelineStore, SqliteStore, StoreError, TenantScope};
