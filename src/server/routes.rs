//! Router configuration for the web server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/reports/:name", get(handlers::download_report))
        .route("/health", get(handlers::health))
        // The browser client is served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
