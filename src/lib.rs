//! pfc - portfolio forecast service: tiered caching, dual-provider quote
//! acquisition and forecast orchestration behind a small HTTP gateway.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use config::Config;
use services::{DurableTier, ForecastOrchestrator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Origin schemes allowed to call the API: the browser extension and HTTPS pages.
const ALLOWED_ORIGIN_PREFIXES: [&str; 2] = ["chrome-extension://", "https://"];

fn is_allowed_origin(origin: &HeaderValue) -> bool {
    origin
        .to_str()
        .map(|origin| {
            ALLOWED_ORIGIN_PREFIXES
                .iter()
                .any(|prefix| origin.starts_with(prefix))
        })
        .unwrap_or(false)
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<ForecastOrchestrator>,
    pub durable: Option<Arc<dyn DurableTier>>,
    pub rate_limiter: Arc<api::rate_limit::GatewayLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        orchestrator: Arc<ForecastOrchestrator>,
        durable: Option<Arc<dyn DurableTier>>,
    ) -> Self {
        let rate_limiter = Arc::new(api::rate_limit::per_minute(config.rate_limit_per_minute));
        Self {
            config,
            orchestrator,
            durable,
            rate_limiter,
            started_at: Instant::now(),
        }
    }
}

/// Build the HTTP router with CORS, panic recovery and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| is_allowed_origin(origin)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .merge(api::router(state.clone()))
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub use error::{AppError, Result};
