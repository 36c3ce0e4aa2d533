//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with a temp-file store and a scripted content service, enabling API
//! tests without a running content service.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sitemind_core::{
    build_stages, config::DatabaseConfig, testing::MockContentService, Config, PipelineConfig,
    PipelineScheduler, SqliteStore, StageContext,
};
use sitemind_server::state::AppState;

/// Re-export fixtures for test convenience
pub use sitemind_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/api/v1/health").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Store shared with the router
    pub store: Arc<SqliteStore>,
    /// Mock content service - script discovery, scrape and processing
    pub content: Arc<MockContentService>,
    /// Scheduler with every stage registered but not started
    pub scheduler: Arc<PipelineScheduler>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with the pipeline enabled.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let content = Arc::new(MockContentService::new());
        let store = Arc::new(SqliteStore::new(&db_path).expect("Failed to create store"));

        let config = Config {
            database: DatabaseConfig { path: db_path },
            pipeline: PipelineConfig {
                enabled: !test_config.disable_pipeline,
                scrape_delay_ms: 0,
                job_attempts: 1,
                job_retry_delay_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let scheduler = Arc::new(PipelineScheduler::from_config(&config.pipeline));
        if config.pipeline.enabled {
            let ctx = StageContext::new(store.clone(), content.clone(), config.pipeline.clone());
            scheduler
                .register_all(build_stages(&ctx), &config.pipeline.stages)
                .await;
        }

        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            Arc::clone(&scheduler),
        ));
        let router = sitemind_server::api::create_router(state);

        Self {
            router,
            store,
            content,
            scheduler,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path).await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path).await
    }

    /// Trigger a stage by job id and return the response.
    pub async fn trigger(&self, stage: &str) -> TestResponse {
        self.post(&format!("/api/v1/pipeline/stages/{}/trigger", stage))
            .await
    }

    /// Wait until no stage run is in progress.
    pub async fn wait_idle(&self) {
        assert!(
            self.scheduler.wait_idle(Duration::from_secs(5)).await,
            "stages did not become idle"
        );
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Leave the pipeline disabled (no stages registered)
    pub disable_pipeline: bool,
}

impl TestConfig {
    /// Create config with the pipeline disabled.
    pub fn without_pipeline() -> Self {
        Self {
            disable_pipeline: true,
        }
    }
}
