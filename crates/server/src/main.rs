use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitemind_core::{
    build_stages, load_config, validate_config, PipelineScheduler, PipelineStore, SqliteStore,
    StageContext, StageName, WebhookContentService,
};
use sitemind_server::{api::create_router, state::AppState};

/// Environment variable naming the configuration file.
const CONFIG_PATH_ENV: &str = "SITEMIND_CONFIG";

/// Set to `json` for one JSON object per log line.
const LOG_FORMAT_ENV: &str = "SITEMIND_LOG_FORMAT";

/// How long shutdown waits for in-flight stage runs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    let json_logs = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // Determine config path
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite store
    let store: Arc<dyn PipelineStore> = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to create pipeline store")?,
    );
    info!("Pipeline store initialized");

    // The content service URL must resolve before anything is scheduled
    let content = Arc::new(
        WebhookContentService::new(&config.content_service)
            .context("Failed to create content service client")?,
    );
    info!("Content service client initialized at {}", content.base_url());

    let scheduler = Arc::new(PipelineScheduler::from_config(&config.pipeline));

    if config.pipeline.enabled {
        let ctx = StageContext::new(Arc::clone(&store), content, config.pipeline.clone());
        let registered = scheduler
            .register_all(build_stages(&ctx), &config.pipeline.stages)
            .await;
        info!("Registered {} pipeline stage(s)", registered);

        scheduler.start().await;

        // First crawl right away instead of one interval from now
        let initial = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = initial.trigger(StageName::Discovery).await {
                warn!("Initial discovery run failed: {}", e);
            }
        });
    } else {
        info!("Pipeline disabled in config");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::clone(&scheduler),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if scheduler.is_running() {
        scheduler.stop().await;
        if !scheduler.wait_idle(SHUTDOWN_GRACE).await {
            warn!("Stage runs still in progress after {:?}", SHUTDOWN_GRACE);
        }
    }
    info!("Scheduler stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
