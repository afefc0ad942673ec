use anyhow::Context;
use pfc::config::Config;
use pfc::services::{
    DurableTier, ForecastOrchestrator, MarketDataAcquirer, Providers, RedisStore, TieredCache,
    FORECAST_NAMESPACE, HISTORY_NAMESPACE, QUOTE_NAMESPACE,
};
use pfc::sources::{AlphaVantageClient, HttpForecastEngine, YahooFinanceClient};
use pfc::{build_router, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pfc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    let config = Arc::new(config);
    info!(
        "Starting pfc ({}) on {}:{}",
        config.environment, config.host, config.port
    );

    // Durable cache tier (optional)
    let durable: Option<Arc<dyn DurableTier>> = match config.redis_url.as_deref() {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!("Redis unavailable, caching locally only: {}", e);
                None
            }
        },
        None => {
            info!("REDIS_URL not set, caching locally only");
            None
        }
    };

    // Quote and history providers
    let alpha_vantage = AlphaVantageClient::new(config.alpha_vantage_api_key.clone());
    if !alpha_vantage.is_configured() {
        warn!("ALPHA_VANTAGE_API_KEY not set, Yahoo Finance is the only live quote provider");
    }
    let yahoo = Arc::new(YahooFinanceClient::new());
    let providers = Providers {
        primary: Arc::new(alpha_vantage),
        secondary: yahoo.clone(),
        history: yahoo,
    };

    // Caches and their sweepers
    let quotes = Arc::new(TieredCache::new(
        QUOTE_NAMESPACE,
        config.cache.quote_ttl,
        durable.clone(),
    ));
    let histories = Arc::new(TieredCache::new(
        HISTORY_NAMESPACE,
        config.cache.history_ttl,
        durable.clone(),
    ));
    let forecasts = Arc::new(TieredCache::new(
        FORECAST_NAMESPACE,
        config.cache.forecast_ttl,
        durable.clone(),
    ));
    quotes.spawn_sweeper(config.cache.sweep_interval);
    histories.spawn_sweeper(config.cache.sweep_interval);
    forecasts.spawn_sweeper(config.cache.sweep_interval);

    // Pipeline
    let acquirer = Arc::new(MarketDataAcquirer::new(
        &config.fetch,
        quotes,
        histories,
        providers,
    ));
    let engine_url = config
        .forecast_engine_url
        .as_deref()
        .context("FORECAST_ENGINE_URL is required")?;
    let engine = Arc::new(HttpForecastEngine::new(engine_url, config.engine_timeout));
    info!("Forecast engine at {}", engine.predict_url());

    let orchestrator = Arc::new(ForecastOrchestrator::new(
        &config, acquirer, forecasts, engine,
    ));

    let state = AppState::new(config.clone(), orchestrator, durable);
    let app = build_router(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("pfc listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
