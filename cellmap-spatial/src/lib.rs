//! Hex-cell tiling for cellmap.
//!
//! This crate owns everything that maps H3 cells onto Web Mercator tiles:
//!
//! - **Stop table**: which H3 resolution is rendered at each zoom, and at
//!   which quadkey precision its coverage index is built
//! - **Coverage index**: for every cell, the quadkeys of the tiles its
//!   boundary touches, stored in the `geohashes` table
//! - **Tile encoding**: cell polygons clipped into MVT layers or emitted as
//!   GeoJSON
//!
//! # Architecture
//!
//! ```text
//!   cells (fact table)
//!        │  r{res}_id pages, finest stop first
//!        ▼
//!   GeohashIndexBuilder ── cell_polygon ── cover_tiles(precision)
//!        │
//!        ▼
//!   geohashes + geohash_builds ──► IndexCatalog (loaded at startup)
//!
//!   request (z/x/y) ──► StopTable ──► quadkey prefix ──► candidate cells
//!        │
//!        ▼
//!   CellCount rows ──► cells_to_features ──► TileEncoder ──► MVT bytes
//! ```
//!
//! # Modules
//!
//! - [`stops`]: Stop and StopTable
//! - [`tile`]: Tile addresses, quadkeys and Mercator projection
//! - [`geometry`]: H3 cell decoding and boundary polygons
//! - [`cover`]: Single-level tile covers
//! - [`builder`]: Coverage index rebuild
//! - [`catalog`]: What the coverage index can serve
//! - [`features`]: Aggregated rows to polygon features
//! - [`mvt`]: Vector tile encoding
//! - [`error`]: Error types

pub mod builder;
pub mod catalog;
pub mod cover;
pub mod error;
pub mod features;
pub mod geometry;
pub mod mvt;
pub mod stops;
pub mod tile;

pub use builder::{
    BatchOutcome, BuildObserver, BuilderConfig, GeohashIndexBuilder, NoopObserver,
    RebuildReport, StopOutcome, StopStatus,
};
pub use catalog::{BuildState, IndexCatalog, IndexStatus};
pub use cover::cover_tiles;
pub use error::{Result, SpatialError};
pub use features::{cells_to_features, to_feature_collection, CellCount, CellFeature, PropertyValue};
pub use geometry::{cell_from_str, cell_from_u64, cell_polygon};
pub use mvt::{empty_tile, TileEncoder, LAYER_NAME};
pub use stops::{Stop, StopTable, DEFAULT_STOPS};
pub use tile::TileId;
