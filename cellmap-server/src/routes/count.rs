//! Match count endpoint: /count

use crate::error::Result;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use cellmap_query::{count_cells, FilterSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CountParams {
    /// URL-encoded JSON filter
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// GET /count?filter=...
///
/// Number of finest-resolution cells with at least one row matching the
/// filter.
pub async fn count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CountParams>,
) -> Result<Json<CountResponse>> {
    let filter = FilterSpec::parse(params.filter.as_deref())?;
    let count = count_cells(
        state.db.as_ref(),
        state.stops.finest().resolution,
        &filter,
        &state.columns,
    )
    .await?;
    Ok(Json(CountResponse { count }))
}
