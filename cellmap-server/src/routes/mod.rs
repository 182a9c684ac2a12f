//! HTTP route handlers and router configuration

mod admin;
mod count;
mod metadata;
mod stats;
mod tiles;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the main application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check with coverage index status
        .route("/health", get(admin::health))
        // Precomputed attribute document (two names for the same document)
        .route("/metadata", get(metadata::metadata))
        .route("/attributes", get(metadata::metadata))
        // Dataset-wide match count
        .route("/count", get(count::count))
        // Footprint statistics
        .route("/stats", post(stats::stats))
        // Vector tiles
        .route("/:version/mvt/:z/:x/:y", get(tiles::tile))
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .with_state(state.clone());

    router = router.layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}
