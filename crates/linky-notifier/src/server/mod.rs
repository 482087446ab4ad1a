//! HTTP API: registration, deregistration and health.

pub mod routes;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "routes_tests.rs"]
mod routes_tests;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Build the notifier's HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/subscribe", post(routes::subscribe))
        .route("/unsubscribe", post(routes::unsubscribe))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
