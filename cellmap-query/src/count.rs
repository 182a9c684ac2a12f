//! Global match count.

use crate::error::Result;
use crate::filter::{FilterColumns, FilterSpec};
use cellmap_db::schema::CELLS_TABLE;
use cellmap_db::{ancestor_column, Database};

/// Distinct cells of resolution `resolution` with at least one fact row
/// matching `filter`.
pub async fn count_cells(
    db: &dyn Database,
    resolution: u8,
    filter: &FilterSpec,
    columns: &FilterColumns,
) -> Result<u64> {
    filter.check_columns(columns)?;
    let compiled = filter.compile(1);
    let col = ancestor_column(resolution);
    let row = db
        .query_one(
            &format!(
                "SELECT count(DISTINCT {col}) FROM {CELLS_TABLE} WHERE {}",
                compiled.predicate
            ),
            &compiled.params,
        )
        .await?;
    let count = row.get_u64(0)?;
    tracing::debug!(resolution, filters = filter.len(), count, "counted matching cells");
    Ok(count)
}
