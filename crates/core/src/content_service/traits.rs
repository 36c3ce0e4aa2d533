use async_trait::async_trait;
use thiserror::Error;

use super::{IngestRequest, IngestResponse, ProcessResponse, ScrapeResponse};

/// Errors from the content service client.
#[derive(Debug, Clone, Error)]
pub enum ContentServiceError {
    /// Webhook URL missing from both the environment and the configuration.
    #[error("content service webhook URL not configured (set CONTENT_SERVICE_URL or content_service.webhook_url)")]
    NotConfigured,

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not finish within the client timeout.
    #[error("request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ContentServiceError {
    /// Whether the call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ContentServiceError::Transport(_) | ContentServiceError::Timeout
        )
    }
}

impl From<reqwest::Error> for ContentServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ContentServiceError::Timeout
        } else if e.is_decode() {
            ContentServiceError::Decode(e.to_string())
        } else {
            ContentServiceError::Transport(e.to_string())
        }
    }
}

/// External scrape / AI / vector-ingest service.
///
/// `None` means the service answered with an empty body.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// URLs found under a website.
    async fn discover_urls(&self, url: &str) -> Result<Vec<String>, ContentServiceError>;

    /// Scrape one page.
    async fn scrape_url(&self, url: &str) -> Result<Option<ScrapeResponse>, ContentServiceError>;

    /// Turn raw content into markdown, summary and keywords.
    async fn process_content(
        &self,
        content: &str,
    ) -> Result<Option<ProcessResponse>, ContentServiceError>;

    /// Push a document into the tenant's vector store.
    async fn ingest(
        &self,
        request: &IngestRequest,
    ) -> Result<Option<IngestResponse>, ContentServiceError>;
}
