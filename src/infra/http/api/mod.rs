pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

/// Routes under `/api`, rate limited per client.
pub fn build_api_router(state: ApiState) -> Router {
    let rate_state = state.clone();

    Router::new()
        .route("/api/sum", post(handlers::compute_sum))
        .route(
            "/api/sum/cache",
            get(handlers::list_cached).delete(handlers::clear_cached),
        )
        .route(
            "/api/sum/cache/{id}",
            get(handlers::get_cached).delete(handlers::delete_cached),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
}
