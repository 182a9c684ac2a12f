//! Attribute document endpoints: /metadata, /attributes

use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::CACHE_CONTROL;
use std::sync::Arc;

/// GET /metadata, GET /attributes
///
/// Serves the precomputed attribute document as loaded at startup.
pub async fn metadata(State(state): State<Arc<AppState>>) -> Response {
    (
        [(CACHE_CONTROL, state.metadata_cache_control.clone())],
        Json(state.attributes.raw().clone()),
    )
        .into_response()
}
