pub mod forecast;
pub mod health;
pub mod rate_limit;

use crate::AppState;
use axum::{middleware, Router};

/// Create the API router. Only the `/v1` routes count against the rate limit.
pub fn router(state: AppState) -> Router<AppState> {
    let v1 = forecast::router()
        .route_layer(middleware::from_fn_with_state(state, rate_limit::enforce));

    Router::new().merge(health::router()).nest("/v1", v1)
}
