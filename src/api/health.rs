use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

const SERVICE_NAME: &str = "pfc";
const READINESS_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct ServiceBanner {
    service: &'static str,
    version: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessChecks {
    api: &'static str,
    durable_cache: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    checks: ReadinessChecks,
}

/// GET /
async fn banner() -> Json<ServiceBanner> {
    Json(ServiceBanner {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// GET /health/ready
///
/// An unreachable or unconfigured durable tier is reported but never fails the probe.
async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let durable_cache = match state.durable.as_ref() {
        Some(durable) => match tokio::time::timeout(READINESS_PING_TIMEOUT, durable.ping()).await {
            Ok(Ok(())) => "ok",
            Ok(Err(e)) => {
                warn!("Durable cache ping failed: {}", e);
                "degraded"
            }
            Err(_) => {
                warn!("Durable cache ping timed out");
                "degraded"
            }
        },
        None => "degraded",
    };

    Json(ReadinessResponse {
        status: "ready",
        checks: ReadinessChecks {
            api: "ok",
            durable_cache,
        },
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}
