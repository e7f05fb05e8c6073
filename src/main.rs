mod analysis;
mod cache;
mod config;
mod db;
mod errors;
mod handlers;
mod ingest;
mod matcher;
mod meta_ads;
mod metrics;
mod models;
mod parsers;
mod reconcile;
mod sheets;
mod store;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::DashboardCache;
use crate::config::Config;
use crate::db::Database;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, and the dataset
/// cache, then starts the Axum server with rate limiting, a request body
/// limit, and CORS applied.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "client_success_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Dataset cache: both sheets and the Meta snapshot, 5 minute TTL
    let cache = Arc::new(DashboardCache::default());
    tracing::info!("Dataset cache initialized (5m TTL)");

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Dashboard read path
        .route("/api/v1/dashboard", get(handlers::get_dashboard))
        .route("/api/v1/clients/:name", get(handlers::get_client))
        .route("/api/v1/risk-overview", get(handlers::get_risk_overview))
        .route("/api/v1/refresh", post(handlers::force_refresh))
        // Meta ads
        .route("/api/v1/meta/accounts", get(handlers::list_meta_accounts))
        .route("/api/v1/meta/insights", get(handlers::get_meta_insights))
        .route(
            "/api/v1/mappings",
            get(handlers::list_mappings).post(handlers::upsert_mapping),
        )
        .route(
            "/api/v1/mappings/:client_name",
            delete(handlers::delete_mapping),
        )
        // Notes
        .route(
            "/api/v1/clients/:name/notes",
            get(handlers::list_notes).post(handlers::create_note),
        )
        .route("/api/v1/notes/important", get(handlers::list_important_notes))
        .route(
            "/api/v1/notes/:id",
            put(handlers::update_note).delete(handlers::delete_note),
        )
        // Meetings
        .route(
            "/api/v1/meetings",
            get(handlers::list_all_meetings).post(handlers::create_meeting),
        )
        .route("/api/v1/meetings/:id", delete(handlers::delete_meeting))
        .route(
            "/api/v1/clients/:name/meetings",
            get(handlers::list_meetings),
        )
        // Fathom ingestion
        .route("/api/v1/ingest/fathom", post(handlers::ingest_fathom))
        .route(
            "/api/v1/domains",
            get(handlers::list_domains).post(handlers::upsert_domain),
        )
        .route("/api/v1/domains/:domain", delete(handlers::delete_domain))
        // Activity log
        .route(
            "/api/v1/clients/:name/activity",
            get(handlers::list_activity),
        )
        .route("/api/v1/activity", get(handlers::list_recent_activity))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (long transcripts fit well under this)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting for the platform probe)
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

    axum::serve(listener, app).await?;

    Ok(())
}
