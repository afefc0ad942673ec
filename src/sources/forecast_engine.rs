use crate::error::{AppError, Result};
use crate::types::{EngineRequest, EngineResponse};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// External statistical forecasting engine. Its output is mandatory for a forecast.
pub trait ForecastEngine: Send + Sync {
    fn forecast(&self, request: EngineRequest) -> BoxFuture<'_, Result<EngineResponse>>;
}

/// Forecasting engine reached over HTTP (`POST {url}/predict`).
pub struct HttpForecastEngine {
    client: Client,
    predict_url: String,
}

impl HttpForecastEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        }
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    async fn predict(&self, request: EngineRequest) -> Result<EngineResponse> {
        debug!(
            "Calling forecast engine for {} tickers ({} series)",
            request.tickers.len(),
            request.historical_data.len()
        );

        let response = self
            .client
            .post(&self.predict_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EngineFailure(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EngineFailure(format!(
                "engine returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<EngineResponse>()
            .await
            .map_err(|e| AppError::EngineFailure(format!("invalid engine response: {}", e)))
    }
}

impl ForecastEngine for HttpForecastEngine {
    fn forecast(&self, request: EngineRequest) -> BoxFuture<'_, Result<EngineResponse>> {
        self.predict(request).boxed()
    }
}
