//! Query layer for cellmap.
//!
//! Turns request inputs into SQL against the `cells` fact table:
//!
//! - [`filter`]: decode and compile attribute filters
//! - [`tile`]: aggregate the cells of one tile
//! - [`count`]: count matching cells across the whole dataset
//! - [`stats`]: attribute statistics over a footprint
//! - [`attributes`]: the precomputed attribute document
//!
//! Every entry point receives its database explicitly; nothing here opens a
//! connection.

pub mod attributes;
pub mod count;
pub mod error;
pub mod filter;
pub mod stats;
pub mod tile;

pub use attributes::AttributeDocument;
pub use count::count_cells;
pub use error::{QueryError, Result};
pub use filter::{ColumnFilter, CompiledFilter, FilterColumns, FilterSpec};
pub use stats::{PropertyKind, PropertyRequest, PropertyStats, StatsQuery, StatsRequest, ValueCount};
pub use tile::{TileFormat, TileQueryEngine, TileRequest, TileRows};
