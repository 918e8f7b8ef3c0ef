use axum::Router;
use axum::routing::get;
use std::sync::Arc;

pub mod handlers;
pub mod responses;

pub use handlers::ApiContext;

pub fn router(context: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/api/routes", get(handlers::get_routes))
        .route("/api/delays", get(handlers::get_delays))
        .route("/api/health", get(handlers::get_health))
        .with_state(context)
}
