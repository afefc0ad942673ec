//! Global inbound request limit for the `/v1` routes.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::warn;

pub type GatewayLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiter allowing `limit` requests per minute, with the full minute as burst.
pub fn per_minute(limit: u32) -> GatewayLimiter {
    let limit = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_minute(limit))
}

pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.rate_limiter.check().is_err() {
        warn!(
            "Rate limit exceeded: {} {}",
            request.method(),
            request.uri().path()
        );
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}
