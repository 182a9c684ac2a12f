//! H3 cell geometry.

use crate::error::{Result, SpatialError};
use geo::{Coord, LineString, Polygon};
use h3o::{CellIndex, Resolution};

/// Decode a stored UBIGINT cell id.
pub fn cell_from_u64(id: u64) -> Result<CellIndex> {
    CellIndex::try_from(id).map_err(|e| SpatialError::InvalidCell(format!("{id}: {e}")))
}

/// Decode a hex cell string such as `"8b2a100d2d9bfff"`.
pub fn cell_from_str(s: &str) -> Result<CellIndex> {
    s.parse::<CellIndex>()
        .map_err(|e| SpatialError::InvalidCell(format!("{s}: {e}")))
}

/// Resolution from a plain integer.
pub fn resolution(res: u8) -> Result<Resolution> {
    Resolution::try_from(res)
        .map_err(|e| SpatialError::config(format!("invalid H3 resolution {res}: {e}")))
}

/// Boundary polygon of `cell` in (lng, lat) degrees.
///
/// Cells that straddle the antimeridian have their western vertices shifted
/// by +360 so the ring stays contiguous; the resulting longitudes may exceed
/// 180.
pub fn cell_polygon(cell: CellIndex) -> Polygon<f64> {
    let mut coords: Vec<Coord<f64>> = cell
        .boundary()
        .iter()
        .map(|ll| Coord {
            x: ll.lng(),
            y: ll.lat(),
        })
        .collect();

    let (min, max) = coords
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.x), hi.max(c.x))
        });
    if max - min > 180.0 {
        for c in &mut coords {
            if c.x < 0.0 {
                c.x += 360.0;
            }
        }
    }

    Polygon::new(LineString::from(coords), vec![])
}
