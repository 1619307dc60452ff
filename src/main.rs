use log_dashboard::{
    analytics::AggregationEngine,
    api::{build_router, AppState},
    config::{Config, ObservabilityConfig},
    metadata::create_metadata_store,
    search::{QueryBuilder, SearchService},
    state::{create_cache, CacheAside, SystemClock},
    store::create_store,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_tracing(&config.observability);

    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Failed to load configuration, using defaults");
    }

    tracing::info!("Starting log dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = log_dashboard::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("Prometheus metrics initialized");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Backing stores
    tracing::info!(
        backend = ?config.elasticsearch.backend,
        index_pattern = %config.elasticsearch.index_pattern,
        "Initializing log store"
    );
    let store = create_store(&config.elasticsearch)?;
    let kv = create_cache(&config.cache)?;
    let metadata = create_metadata_store(&config.metadata)?;

    // Components
    let search = Arc::new(SearchService::new(
        store.clone(),
        QueryBuilder::new(config.query.clone()),
    ));
    let analytics = Arc::new(AggregationEngine::new(
        store.clone(),
        kv.clone(),
        metadata.clone(),
    ));
    let cache = Arc::new(CacheAside::new(
        kv,
        Arc::new(SystemClock),
        config.cache.retention(),
    ));

    let health = analytics.check_health().await;
    if health.healthy {
        tracing::info!("All dependencies healthy");
    } else {
        tracing::warn!(services = ?health.services, "Starting with unhealthy dependencies");
    }

    let app_state = AppState::new(search, analytics, cache, config.cache.result_ttl());
    let app = build_router(
        app_state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/api/health", http_addr);
    tracing::info!("   Statistics: http://{}/api/stats", http_addr);
    tracing::info!("   Metrics: http://{}/metrics", http_addr);

    axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("log_dashboard={},tower_http=info", observability.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
