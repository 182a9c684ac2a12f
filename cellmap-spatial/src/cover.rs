//! Single-level tile covers.
//!
//! The cover of a polygon at precision `p` is the set of zoom-`p` tiles whose
//! bounds intersect it. Keys are returned sorted, so covers are deterministic.

use crate::tile::{lat_to_tile_y, lng_to_tile_x, tile_rect, TileId, MAX_LATITUDE, MAX_ZOOM};
use crate::error::{Result, SpatialError};
use geo::{BoundingRect, Intersects, Polygon};

/// Quadkeys of every zoom-`precision` tile intersecting `polygon`.
///
/// Longitudes past 180 (antimeridian-shifted cells) wrap onto columns at the
/// western edge of the grid. Polygons lying entirely outside the Mercator
/// latitude range have an empty cover.
pub fn cover_tiles(polygon: &Polygon<f64>, precision: u8) -> Result<Vec<String>> {
    if precision > MAX_ZOOM {
        return Err(SpatialError::config(format!(
            "cover precision {precision} exceeds maximum {MAX_ZOOM}"
        )));
    }
    let Some(bbox) = polygon.bounding_rect() else {
        return Ok(Vec::new());
    };
    if bbox.min().y > MAX_LATITUDE || bbox.max().y < -MAX_LATITUDE {
        return Ok(Vec::new());
    }

    let n = 1i64 << precision;
    let x0 = lng_to_tile_x(bbox.min().x, precision).floor() as i64;
    let x1 = lng_to_tile_x(bbox.max().x, precision).floor() as i64;
    let y0 = (lat_to_tile_y(bbox.max().y, precision).floor() as i64).clamp(0, n - 1);
    let y1 = (lat_to_tile_y(bbox.min().y, precision).floor() as i64).clamp(0, n - 1);

    let mut keys = Vec::new();
    for x in x0..=x1 {
        for y in y0..=y1 {
            if !tile_rect(precision, x, y).intersects(polygon) {
                continue;
            }
            let wrapped = x.rem_euclid(n);
            let tile = TileId::new(precision, wrapped as u32, y as u32)?;
            keys.push(tile.quadkey());
        }
    }
    keys.sort_unstable();
    keys.dedup();
    Ok(keys)
}
