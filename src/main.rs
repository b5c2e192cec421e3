use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phone_risk_api::analyzer::Analyzer;
use phone_risk_api::cache::AnalysisCache;
use phone_risk_api::collector::EvidenceCollector;
use phone_risk_api::config::Config;
use phone_risk_api::db::Database;
use phone_risk_api::db_storage::PgAnalysisStorage;
use phone_risk_api::handlers::{self, AppState};
use phone_risk_api::rules::RiskPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phone_risk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool and schema
    let db = Database::new(&config.database_url).await?;
    let storage = Arc::new(PgAnalysisStorage::new(db.pool.clone()));

    // Analysis result cache keyed by (E.164, deep_scan)
    let cache = Arc::new(AnalysisCache::new(Duration::from_secs(
        config.cache_ttl_hours * 3600,
    )));
    tracing::info!("Analysis cache initialized ({}h TTL)", config.cache_ttl_hours);

    // Provider fan-out with per-source breakers and quotas
    let collector = Arc::new(EvidenceCollector::from_config(&config)?);

    let policy = RiskPolicy::from_config(&config.policy);
    let analyzer = Arc::new(Analyzer::new(
        collector,
        policy,
        Arc::clone(&cache),
        storage.clone(),
    ));

    let app_state = Arc::new(AppState {
        analyzer,
        storage,
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

    let protected_routes = Router::new()
        .route("/api/v1/analyze", post(handlers::analyze_phone))
        .route(
            "/api/v1/analyses",
            get(handlers::list_analyses).delete(handlers::clear_analyses),
        )
        .route(
            "/api/v1/analyses/:id",
            get(handlers::get_analysis).delete(handlers::delete_analysis),
        )
        .route("/api/v1/analyses/search", post(handlers::search_analyses))
        .route("/api/v1/statistics", get(handlers::get_statistics))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting for platform probes
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
