//! Application setup and server configuration.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use edhrec_scraper::ScraperStorage;

use crate::routes::{admin_router, AdminState};

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the Axum application router.
pub fn build_app(storage: Arc<dyn ScraperStorage>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(admin_router(AdminState { storage }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
