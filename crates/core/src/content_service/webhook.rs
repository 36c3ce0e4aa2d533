//! HTTP client for the content service webhooks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{ContentServiceConfig, EndpointPaths};
use crate::metrics;

use super::{
    ContentService, ContentServiceError, IngestRequest, IngestResponse, ProcessRequest,
    ProcessResponse, RetryPolicy, ScrapeResponse, UrlRequest,
};

/// Longest error body kept in `ContentServiceError::Status`.
const MAX_ERROR_BODY: usize = 200;

/// Content service reached over HTTP POST, one webhook per operation.
pub struct WebhookContentService {
    client: Client,
    base_url: String,
    endpoints: EndpointPaths,
    retry: RetryPolicy,
}

impl WebhookContentService {
    /// Build a client, resolving the webhook URL from the environment or config.
    pub fn new(config: &ContentServiceConfig) -> Result<Self, ContentServiceError> {
        let base_url = config
            .resolve_webhook_url()
            .ok_or(ContentServiceError::NotConfigured)?;
        Self::with_base_url(base_url, config)
    }

    /// Build a client against an explicit base URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &ContentServiceConfig,
    ) -> Result<Self, ContentServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ContentServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints: config.endpoints.clone(),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST `body` with retries and decode the answer. An empty or `null`
    /// body decodes to `None`.
    async fn post<B, R>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<Option<R>, ContentServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let url = self.endpoint(path);
        let start = Instant::now();

        let result = self
            .retry
            .run(operation, || self.post_once(operation, &url, body))
            .await;

        metrics::CONTENT_SERVICE_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        metrics::CONTENT_SERVICE_REQUESTS
            .with_label_values(&[operation, if result.is_ok() { "success" } else { "error" }])
            .inc();

        result
    }

    async fn post_once<B, R>(
        &self,
        operation: &'static str,
        url: &str,
        body: &B,
    ) -> Result<Option<R>, ContentServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        debug!(operation, url, "Calling content service");

        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentServiceError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str::<Option<R>>(&text)
            .map_err(|e| ContentServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ContentService for WebhookContentService {
    async fn discover_urls(&self, url: &str) -> Result<Vec<String>, ContentServiceError> {
        let request = UrlRequest {
            url: url.to_string(),
        };
        let urls: Option<Vec<String>> = self
            .post("fetch-urls", &self.endpoints.fetch_urls, &request)
            .await?;
        Ok(urls.unwrap_or_default())
    }

    async fn scrape_url(&self, url: &str) -> Result<Option<ScrapeResponse>, ContentServiceError> {
        let request = UrlRequest {
            url: url.to_string(),
        };
        self.post("scrape-url", &self.endpoints.scrape_url, &request)
            .await
    }

    async fn process_content(
        &self,
        content: &str,
    ) -> Result<Option<ProcessResponse>, ContentServiceError> {
        let request = ProcessRequest {
            content: content.to_string(),
        };
        self.post("process-content", &self.endpoints.process_content, &request)
            .await
    }

    async fn ingest(
        &self,
        request: &IngestRequest,
    ) -> Result<Option<IngestResponse>, ContentServiceError> {
        self.post("ingest-rag", &self.endpoints.ingest_rag, request)
            .await
    }
}
