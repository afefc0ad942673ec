use crate::types::QuoteSource;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single provider failed. Recovered locally unless every source fails.
    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable {
        provider: QuoteSource,
        message: String,
    },

    #[error("All sources failed: {0}")]
    AllSourcesFailed(String),

    #[error("Forecast engine failure: {0}")]
    EngineFailure(String),

    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),

    /// Durable cache tier unreachable. Logged by the cache, never returned to callers.
    #[error("Durable cache degraded: {0}")]
    CacheDegraded(String),

    #[error("Rate limit exceeded, try again later")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

impl AppError {
    /// Pipeline stage the error belongs to, reported alongside the message.
    pub fn stage(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::SerdeJson(_) => "validation",
            AppError::ProviderUnavailable { .. } | AppError::AllSourcesFailed(_) => "acquisition",
            AppError::EngineFailure(_) => "forecasting",
            AppError::DeadlineExceeded(stage) => *stage,
            AppError::CacheDegraded(_) | AppError::Redis(_) => "cache",
            AppError::RateLimited => "gateway",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::SerdeJson(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::ProviderUnavailable { .. }
            | AppError::AllSourcesFailed(_)
            | AppError::EngineFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::CacheDegraded(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "stage": self.stage(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
