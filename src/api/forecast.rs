use crate::error::{AppError, Result};
use crate::types::{ForecastRequest, PortfolioForecast, TickerQuote};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub time: DateTime<Utc>,
}

/// POST /v1/forecast
async fn create_forecast(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ForecastRequest>, JsonRejection>,
) -> Result<Json<PortfolioForecast>> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let forecast = state.orchestrator.generate_forecast(&request).await?;
    Ok(Json(forecast))
}

/// GET /v1/tickers/:symbol
async fn get_ticker(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<TickerQuote>> {
    let quote = state.orchestrator.ticker_quote(&symbol).await?;
    Ok(Json(quote))
}

/// POST /v1/admin/refresh
async fn refresh_cache(State(state): State<AppState>) -> Json<RefreshResponse> {
    state.orchestrator.refresh_cache().await;
    Json(RefreshResponse {
        message: "cache refreshed",
        time: Utc::now(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forecast", post(create_forecast))
        .route("/tickers/:symbol", get(get_ticker))
        .route("/admin/refresh", post(refresh_cache))
}
