//! Testing utilities and mock implementations.
//!
//! This module provides a scripted content service and a controllable clock,
//! allowing the whole pipeline to be exercised without external services or
//! real waiting.
//!
//! # Example
//!
//! ```rust,ignore
//! use sitemind_core::testing::{fixtures, ManualClock, MockContentService};
//!
//! let content = MockContentService::new();
//! let clock = ManualClock::starting_now();
//!
//! content.set_discovered_urls("http://x.test", fixtures::urls(&["/a"])).await;
//! clock.advance(chrono::Duration::hours(2));
//! ```

mod manual_clock;
mod mock_content_service;

pub use manual_clock::ManualClock;
pub use mock_content_service::MockContentService;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::content_service::{ProcessMetadata, ProcessResponse, ScrapeResponse};
    use crate::store::{CreateWebsiteRequest, PipelineStore, TenantScope, Website};

    /// Owned URL list.
    pub fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Register a website for `organization_id`.
    pub fn website(store: &dyn PipelineStore, organization_id: &str, base_url: &str) -> Website {
        store
            .create_website(
                &TenantScope::tenant(organization_id),
                CreateWebsiteRequest {
                    name: base_url.to_string(),
                    base_url: base_url.to_string(),
                },
            )
            .expect("failed to create fixture website")
    }

    /// Successful scrape carrying markdown.
    pub fn scrape_markdown(markdown: &str) -> ScrapeResponse {
        ScrapeResponse {
            success: true,
            markdown_content: Some(markdown.to_string()),
            html_length: markdown.len() as u64,
            ..Default::default()
        }
    }

    /// Processed content with a summary and one keyword.
    pub fn processed(markdown: &str) -> ProcessResponse {
        ProcessResponse {
            markdown_content: Some(markdown.to_string()),
            metadata: ProcessMetadata {
                summary: Some(format!("Summary of {}", markdown)),
                keywords: vec!["keyword".to_string()],
            },
        }
    }
}
