use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::pipeline::PipelineConfig;

/// Environment variable that takes precedence over `content_service.webhook_url`.
pub const WEBHOOK_URL_ENV: &str = "CONTENT_SERVICE_URL";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub content_service: ContentServiceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sitemind.db")
}

/// External content service (scrape / AI / vector ingest webhooks).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentServiceConfig {
    /// Base webhook URL, e.g. "https://n8n.example.com/webhook".
    /// `CONTENT_SERVICE_URL` overrides this value when set.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Path of each operation, appended to the webhook URL.
    #[serde(default)]
    pub endpoints: EndpointPaths,
    /// Overall timeout of a single HTTP call in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retry policy for transport failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ContentServiceConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            endpoints: EndpointPaths::default(),
            timeout_secs: default_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl ContentServiceConfig {
    /// Resolve the webhook URL: environment override first, then configuration.
    pub fn resolve_webhook_url(&self) -> Option<String> {
        self.resolve_with(std::env::var(WEBHOOK_URL_ENV).ok())
    }

    fn resolve_with(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.webhook_url
                    .clone()
                    .filter(|v| !v.trim().is_empty())
            })
            .map(|v| v.trim().trim_end_matches('/').to_string())
    }
}

fn default_timeout() -> u64 {
    30
}

/// Per-operation webhook paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointPaths {
    #[serde(default = "default_fetch_urls_path")]
    pub fetch_urls: String,
    #[serde(default = "default_scrape_url_path")]
    pub scrape_url: String,
    #[serde(default = "default_process_content_path")]
    pub process_content: String,
    #[serde(default = "default_ingest_rag_path")]
    pub ingest_rag: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            fetch_urls: default_fetch_urls_path(),
            scrape_url: default_scrape_url_path(),
            process_content: default_process_content_path(),
            ingest_rag: default_ingest_rag_path(),
        }
    }
}

fn default_fetch_urls_path() -> String {
    "fetch-urls".to_string()
}

fn default_scrape_url_path() -> String {
    "scrape-url".to_string()
}

fn default_process_content_path() -> String {
    "process-content".to_string()
}

fn default_ingest_rag_path() -> String {
    "ingest-rag".to_string()
}

/// Retry configuration for content service calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one (default: 2000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

/// Sanitized config for API responses (webhook URL redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub content_service: SanitizedContentServiceConfig,
    pub pipeline: PipelineConfig,
}

/// Sanitized content service config (URL hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedContentServiceConfig {
    pub webhook_configured: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            content_service: SanitizedContentServiceConfig {
                webhook_configured: config.content_service.resolve_webhook_url().is_some(),
                timeout_secs: config.content_service.timeout_secs,
                max_retries: config.content_service.retry.max_retries,
            },
            pipeline: config.pipeline.clone(),
        }
    }
}
