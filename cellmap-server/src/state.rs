//! Application state management
//!
//! Everything a handler needs is built once at startup: the database handle,
//! the validated stop table, the coverage index catalog, the filterable
//! columns of the fact table and the attribute document. Handlers share it
//! through `Arc<AppState>`.
//!
//! The catalog is a snapshot. Rebuilding the index while the server runs is
//! not supported; restart the server after `cellmap rebuild-index`.

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use cellmap_db::{DuckDbDatabase, SharedDatabase};
use cellmap_query::{AttributeDocument, FilterColumns, StatsQuery, TileQueryEngine};
use cellmap_spatial::{IndexCatalog, StopTable, TileEncoder};
use http::HeaderValue;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Database capability shared by every component
    pub db: SharedDatabase,
    /// Validated zoom stops
    pub stops: Arc<StopTable>,
    /// What the coverage index can serve
    pub catalog: Arc<IndexCatalog>,
    /// Columns filters may reference
    pub columns: Arc<FilterColumns>,
    /// Precomputed attribute document
    pub attributes: Arc<AttributeDocument>,
    /// Tile aggregation
    pub tiles: TileQueryEngine,
    /// Footprint statistics
    pub stats: StatsQuery,
    /// Vector tile encoder
    pub encoder: TileEncoder,
    /// Cache-Control for vector tile responses
    pub tile_cache_control: HeaderValue,
    /// Cache-Control for GeoJSON tile responses
    pub geojson_cache_control: HeaderValue,
    /// Cache-Control for the attribute document
    pub metadata_cache_control: HeaderValue,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Open the configured database read-only and load the attribute document.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(ServerError::config)?;
        if !config.db_path.exists() {
            return Err(ServerError::config(format!(
                "database file {} does not exist (set DUCKDB_PATH)",
                config.db_path.display()
            )));
        }
        let db = DuckDbDatabase::open_read_only(&config.db_path)?;
        let attributes = AttributeDocument::load(&config.attributes_path)?;
        Self::with_database(config, Arc::new(db), attributes).await
    }

    /// Build state around an already opened database.
    pub async fn with_database(
        config: ServerConfig,
        db: SharedDatabase,
        attributes: AttributeDocument,
    ) -> Result<Self> {
        config.validate().map_err(ServerError::config)?;

        let stops = Arc::new(config.stops.clone());
        let catalog = Arc::new(IndexCatalog::load(db.as_ref()).await?);
        let columns = Arc::new(FilterColumns::load(db.as_ref()).await?);
        let attributes = Arc::new(attributes);

        for stop in stops.iter() {
            if let Err(e) = catalog.ensure_servable(stop) {
                tracing::warn!(
                    resolution = stop.resolution,
                    min_zoom = stop.min_zoom,
                    max_zoom = stop.max_zoom,
                    error = %e,
                    "zoom range cannot be served until the coverage index is rebuilt"
                );
            }
        }

        let tiles = TileQueryEngine::new(
            db.clone(),
            stops.clone(),
            catalog.clone(),
            columns.clone(),
        );
        let stats = StatsQuery::new(
            db.clone(),
            stops.finest().resolution,
            attributes.clone(),
            columns.clone(),
        )
        .with_max_footprint(config.max_footprint_cells);

        let tile_cache_control = HeaderValue::from_str(&config.tile_cache_control)
            .map_err(|e| ServerError::config(format!("tile_cache_control: {e}")))?;
        let geojson_cache_control = HeaderValue::from_str(&config.geojson_cache_control)
            .map_err(|e| ServerError::config(format!("geojson_cache_control: {e}")))?;
        let metadata_cache_control = HeaderValue::from_str(&config.metadata_cache_control)
            .map_err(|e| ServerError::config(format!("metadata_cache_control: {e}")))?;

        tracing::info!(
            stops = stops.len(),
            filterable_columns = columns.len(),
            attributes = attributes.len(),
            index_complete = catalog.covers(&stops),
            "application state ready"
        );

        Ok(Self {
            config,
            db,
            stops,
            catalog,
            columns,
            attributes,
            tiles,
            stats,
            encoder: TileEncoder::new(),
            tile_cache_control,
            geojson_cache_control,
            metadata_cache_control,
            start_time: Instant::now(),
        })
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
