//! The four ingestion stages.
//!
//! Rows move forward through statuses; each stage selects the rows in its
//! prerequisite state:
//! - **Discovery** (`fetch-urls`): websites to crawl → new pending pages
//! - **Scrape** (`scrape-pages`): pending pages → raw content
//! - **Enrich** (`process-pages`): raw content → markdown, summary, keywords
//! - **Ingest** (`ingest-pages`): markdown → vector store, then website roll-up

mod clock;
mod config;
mod discovery;
mod enrich;
mod ingest;
mod scrape;
mod stage;
mod types;

pub use clock::{Clock, SystemClock};
pub use config::{PipelineConfig, StageSchedule, StageSchedules};
pub use discovery::DiscoveryStage;
pub use enrich::EnrichStage;
pub use ingest::IngestStage;
pub use scrape::ScrapeStage;
pub use stage::{build_stages, Stage, StageContext};
pub use types::{PipelineError, StageName, StageReport};
