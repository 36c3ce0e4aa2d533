//! Mock content service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::content_service::{
    ContentService, ContentServiceError, IngestRequest, IngestResponse, ProcessResponse,
    ScrapeResponse,
};

/// Scripted answers, keyed by URL (discover, scrape, ingest) or by content (process).
#[derive(Default)]
struct Script {
    discovered: HashMap<String, Vec<String>>,
    scrapes: HashMap<String, ScrapeResponse>,
    default_scrape: Option<ScrapeResponse>,
    processed: HashMap<String, ProcessResponse>,
    default_process: Option<ProcessResponse>,
    ingests: HashMap<String, IngestResponse>,
    url_failures: HashMap<String, ContentServiceError>,
    content_failures: HashMap<String, ContentServiceError>,
    url_delays: HashMap<String, Duration>,
}

/// Calls received, in order.
#[derive(Default)]
struct Recorded {
    discover: Vec<String>,
    scrape: Vec<String>,
    process: Vec<String>,
    ingest: Vec<IngestRequest>,
}

/// Mock implementation of the ContentService trait.
///
/// Provides controllable behavior for testing:
/// - Scripted responses per URL or per content
/// - Persistent per-URL failures and a one-shot next error
/// - Artificial latency on every call or on a single URL
/// - Recorded calls for assertions
///
/// Unscripted calls answer like an empty service: no URLs, `None` for scrape
/// and process, and a successful ingest.
///
/// # Example
///
/// ```rust,ignore
/// use sitemind_core::testing::{MockContentService, fixtures};
///
/// let content = MockContentService::new();
/// content.set_discovered_urls("http://x.test", fixtures::urls(&["/a", "/b"])).await;
/// content.fail_url("/b", ContentServiceError::Timeout).await;
///
/// // ... run stages ...
///
/// assert_eq!(content.scrape_calls().await, vec!["/a", "/b"]);
/// ```
#[derive(Clone, Default)]
pub struct MockContentService {
    script: Arc<RwLock<Script>>,
    recorded: Arc<RwLock<Recorded>>,
    next_error: Arc<RwLock<Option<ContentServiceError>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockContentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockContentService")
            .field("script", &"<script>")
            .field("recorded", &"<recorded>")
            .finish()
    }
}

impl MockContentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs returned when discovering `base_url`.
    pub async fn set_discovered_urls(&self, base_url: &str, urls: Vec<String>) {
        self.script
            .write()
            .await
            .discovered
            .insert(base_url.to_string(), urls);
    }

    pub async fn set_scrape_response(&self, url: &str, response: ScrapeResponse) {
        self.script
            .write()
            .await
            .scrapes
            .insert(url.to_string(), response);
    }

    /// Response for every URL without a scripted one.
    pub async fn set_default_scrape_response(&self, response: ScrapeResponse) {
        self.script.write().await.default_scrape = Some(response);
    }

    pub async fn set_process_response(&self, content: &str, response: ProcessResponse) {
        self.script
            .write()
            .await
            .processed
            .insert(content.to_string(), response);
    }

    /// Response for every content without a scripted one.
    pub async fn set_default_process_response(&self, response: ProcessResponse) {
        self.script.write().await.default_process = Some(response);
    }

    pub async fn set_ingest_response(&self, url: &str, response: IngestResponse) {
        self.script
            .write()
            .await
            .ingests
            .insert(url.to_string(), response);
    }

    /// Make every discover, scrape or ingest call for `url` fail.
    pub async fn fail_url(&self, url: &str, error: ContentServiceError) {
        self.script
            .write()
            .await
            .url_failures
            .insert(url.to_string(), error);
    }

    /// Make every process call for `content` fail.
    pub async fn fail_content(&self, content: &str, error: ContentServiceError) {
        self.script
            .write()
            .await
            .content_failures
            .insert(content.to_string(), error);
    }

    /// Configure the next call, whatever the operation, to fail.
    pub async fn set_next_error(&self, error: ContentServiceError) {
        *self.next_error.write().await = Some(error);
    }

    /// Delay every call by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Delay discover and scrape calls for `url` only.
    pub async fn set_url_delay(&self, url: &str, delay: Duration) {
        self.script
            .write()
            .await
            .url_delays
            .insert(url.to_string(), delay);
    }

    pub async fn discover_calls(&self) -> Vec<String> {
        self.recorded.read().await.discover.clone()
    }

    pub async fn scrape_calls(&self) -> Vec<String> {
        self.recorded.read().await.scrape.clone()
    }

    pub async fn process_calls(&self) -> Vec<String> {
        self.recorded.read().await.process.clone()
    }

    pub async fn ingest_calls(&self) -> Vec<IngestRequest> {
        self.recorded.read().await.ingest.clone()
    }

    async fn url_delay(&self, url: &str) {
        let delay = self.script.read().await.url_delays.get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Apply latency, then the one-shot error or a scripted failure.
    async fn before_call(
        &self,
        failures: impl FnOnce(&Script) -> Option<ContentServiceError> + Send,
    ) -> Result<(), ContentServiceError> {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        match failures(&*self.script.read().await) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContentService for MockContentService {
    async fn discover_urls(&self, url: &str) -> Result<Vec<String>, ContentServiceError> {
        self.recorded.write().await.discover.push(url.to_string());
        self.url_delay(url).await;
        self.before_call(|s| s.url_failures.get(url).cloned()).await?;

        Ok(self
            .script
            .read()
            .await
            .discovered
            .get(url)
            .cloned()
            .unwrap_or_default())
    }

    async fn scrape_url(&self, url: &str) -> Result<Option<ScrapeResponse>, ContentServiceError> {
        self.recorded.write().await.scrape.push(url.to_string());
        self.url_delay(url).await;
        self.before_call(|s| s.url_failures.get(url).cloned()).await?;

        let script = self.script.read().await;
        Ok(script
            .scrapes
            .get(url)
            .or(script.default_scrape.as_ref())
            .cloned())
    }

    async fn process_content(
        &self,
        content: &str,
    ) -> Result<Option<ProcessResponse>, ContentServiceError> {
        self.recorded.write().await.process.push(content.to_string());
        self.before_call(|s| s.content_failures.get(content).cloned())
            .await?;

        let script = self.script.read().await;
        Ok(script
            .processed
            .get(content)
            .or(script.default_process.as_ref())
            .cloned())
    }

    async fn ingest(
        &self,
        request: &IngestRequest,
    ) -> Result<Option<IngestResponse>, ContentServiceError> {
        self.recorded.write().await.ingest.push(request.clone());
        self.before_call(|s| s.url_failures.get(&request.url).cloned())
            .await?;

        let response = self
            .script
            .read()
            .await
            .ingests
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| IngestResponse {
                success: true,
                message: None,
                tenant_id: Some(request.tenant_id.clone()),
            });
        Ok(Some(response))
    }
}
