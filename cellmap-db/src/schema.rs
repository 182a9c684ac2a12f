//! Table names, DDL and schema introspection.
//!
//! ```text
//! cells           one row per finest-resolution cell
//!                 r{res}_id UBIGINT for every stop resolution + attributes
//! geohashes       (resolution, cell_id, cover_tile, precision)
//! geohash_builds  one status row per stop of the last rebuild
//! ```

use crate::database::Database;
use crate::error::Result;
use crate::value::SqlValue;

/// Fact table.
pub const CELLS_TABLE: &str = "cells";

/// Coverage index table.
pub const GEOHASH_TABLE: &str = "geohashes";

/// Per-stop build status table.
pub const BUILD_TABLE: &str = "geohash_builds";

/// Drop-and-recreate DDL for the coverage index and its status table.
pub const RECREATE_INDEX_TABLES: &str = "
    DROP TABLE IF EXISTS geohashes;
    CREATE TABLE geohashes (
        resolution INTEGER NOT NULL,
        cell_id UBIGINT NOT NULL,
        cover_tile VARCHAR NOT NULL,
        precision INTEGER NOT NULL
    );
    DROP TABLE IF EXISTS geohash_builds;
    CREATE TABLE geohash_builds (
        resolution INTEGER NOT NULL,
        precision INTEGER NOT NULL,
        status VARCHAR NOT NULL,
        cells UBIGINT NOT NULL,
        entries UBIGINT NOT NULL,
        error VARCHAR,
        finished_at TIMESTAMP NOT NULL
    );
";

/// Name of the ancestor id column for a resolution, e.g. `r7_id`.
pub fn ancestor_column(resolution: u8) -> String {
    format!("r{resolution}_id")
}

/// True for `r{digits}_id` column names.
pub fn is_ancestor_column(name: &str) -> bool {
    name.strip_prefix('r')
        .and_then(|rest| rest.strip_suffix("_id"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Double-quoted SQL identifier; embedded quotes are doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A column of a table as reported by `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// List the columns of `table` in declaration order.
pub async fn table_columns(db: &dyn Database, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows = db
        .query(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_name = $1 ORDER BY ordinal_position",
            &[SqlValue::from(table)],
        )
        .await?;
    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.get_str(0)?.to_string(),
                data_type: row.get_str(1)?.to_string(),
            })
        })
        .collect()
}

/// True if `table` exists in the main schema.
pub async fn table_exists(db: &dyn Database, table: &str) -> Result<bool> {
    let row = db
        .query_one(
            "SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
            &[SqlValue::from(table)],
        )
        .await?;
    Ok(row.get_u64(0)? > 0)
}
