//! Wire types of the content service webhooks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of the discover and scrape calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlRequest {
    pub url: String,
}

/// Body of the process call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRequest {
    pub content: String,
}

/// Result of scraping one URL.
///
/// Only the content fields drive the pipeline; the rest is accepted in
/// whatever shape the scraper sends, `null` included.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ScrapeResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Strings or link objects, depending on the scraper.
    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub html_length: u64,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub markdown_content: Option<String>,
}

impl ScrapeResponse {
    /// Markdown if present, otherwise HTML. Blank strings count as absent.
    pub fn best_content(&self) -> Option<&str> {
        non_blank(self.markdown_content.as_deref()).or(non_blank(self.html_content.as_deref()))
    }
}

/// Result of AI processing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub markdown_content: Option<String>,
    #[serde(default)]
    pub metadata: ProcessMetadata,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ProcessMetadata {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
}

/// Body of the vector-ingest call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRequest {
    pub tenant_id: String,
    pub url: String,
    pub metadata: IngestMetadata,
    pub markdown_content: String,
}

/// Metadata stored alongside the ingested document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub source_url: String,
}

/// Result of the vector-ingest call.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "company_id")]
    pub tenant_id: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
