use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_lead_discovery::config::Config;
use rust_lead_discovery::db::Database;
use rust_lead_discovery::db_storage::LeadStorage;
use rust_lead_discovery::engine::DiscoveryEngine;
use rust_lead_discovery::handlers::{self, AppState};
use rust_lead_discovery::notifier::{LogNotifier, Notifier, WebhookNotifier};
use rust_lead_discovery::repository::{InMemoryLeadRepository, LeadRepository};
use rust_lead_discovery::scheduler::{DiscoveryScheduler, JobStore};
use rust_lead_discovery::scoring::{InMemoryOutcomeLog, WeightsStore};
use rust_lead_discovery::sources::build_http_client;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the optional database, the discovery
/// engine and scheduler, then serves the HTTP API until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_lead_discovery=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Persistence: Postgres when configured, in-memory otherwise
    let repository: Arc<dyn LeadRepository> = match config.database_url {
        Some(ref url) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            let storage = LeadStorage::new(db.pool.clone());
            storage.ensure_schema().await?;
            Arc::new(storage)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; discovered leads are kept in memory only");
            Arc::new(InMemoryLeadRepository::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match config.alert_webhook_url {
        Some(ref url) => {
            tracing::info!("✓ Alert webhook configured");
            Arc::new(WebhookNotifier::new(url.clone(), build_http_client(config.source_timeout())?))
        }
        None => Arc::new(LogNotifier),
    };

    let client = build_http_client(config.source_timeout())?;
    let weights = Arc::new(WeightsStore::new());
    let history = Arc::new(InMemoryOutcomeLog::new());
    let engine = Arc::new(DiscoveryEngine::from_config(&config, client, weights, history));

    let scheduler = Arc::new(
        DiscoveryScheduler::new(engine.clone(), Arc::new(JobStore::new()), repository, notifier)
            .with_timing(config.discovery_deadline(), config.scheduler_poll_interval())
            .with_high_value_threshold(config.high_value_threshold),
    );

    let shutdown = CancellationToken::new();
    let scheduler_task = {
        let scheduler = scheduler.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        engine,
        scheduler,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/discover", post(handlers::discover))
        .route("/api/v1/strategy", get(handlers::get_strategy))
        .route("/api/v1/jobs", get(handlers::list_jobs).post(handlers::create_job))
        .route("/api/v1/jobs/:id/run", post(handlers::run_job))
        .route("/api/v1/outcomes", post(handlers::record_outcome))
        .route("/api/v1/weights/recalculate", post(handlers::recalculate))
        .route("/api/v1/weights/:industry", get(handlers::get_weights))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown signal received");
        server_shutdown.cancel();
    })
    .await?;

    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        tracing::error!("Scheduler task ended abnormally: {}", e);
    }

    Ok(())
}
