//! Client for the external content service (discover, scrape, process, ingest).

mod retry;
mod traits;
mod types;
mod webhook;

pub use retry::RetryPolicy;
pub use traits::{ContentService, ContentServiceError};
pub use types::*;
pub use webhook::WebhookContentService;
