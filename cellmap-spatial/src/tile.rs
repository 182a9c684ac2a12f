//! Web Mercator tile addressing.
//!
//! Tiles are addressed `(z, x, y)` with `y = 0` at the north edge. Quadkeys
//! follow the Bing/tilebelt convention: one base-4 digit per zoom level, most
//! significant level first, `digit = xbit + 2 * ybit`.

use crate::error::{Result, SpatialError};
use geo::{coord, Rect};
use std::f64::consts::PI;
use std::fmt;

/// Highest zoom a [`TileId`] may carry.
pub const MAX_ZOOM: u8 = 24;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A validated tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Build a tile address, rejecting coordinates outside `0..2^z`.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        if z > MAX_ZOOM {
            return Err(SpatialError::invalid_tile(format!(
                "zoom {z} exceeds maximum {MAX_ZOOM}"
            )));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(SpatialError::invalid_tile(format!(
                "tile {z}/{x}/{y} is outside the {n}x{n} grid"
            )));
        }
        Ok(Self { z, x, y })
    }

    /// Quadkey of this tile; empty at zoom 0.
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(usize::from(self.z));
        for level in (1..=self.z).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(char::from(digit));
        }
        key
    }

    /// Geographic bounds `(west, south, east, north)` in degrees.
    pub fn bounds(&self) -> Rect<f64> {
        tile_rect(self.z, i64::from(self.x), i64::from(self.y))
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Fractional tile column of `lng` at zoom `z`. Not wrapped, so longitudes
/// past 180 map past the last column.
pub fn lng_to_tile_x(lng: f64, z: u8) -> f64 {
    (lng + 180.0) / 360.0 * (1u64 << z) as f64
}

/// Fractional tile row of `lat` at zoom `z`, clamped to the Mercator range.
pub fn lat_to_tile_y(lat: f64, z: u8) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let n = (1u64 << z) as f64;
    (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n
}

fn tile_x_to_lng(x: f64, z: u8) -> f64 {
    x / (1u64 << z) as f64 * 360.0 - 180.0
}

fn tile_y_to_lat(y: f64, z: u8) -> f64 {
    let n = PI - 2.0 * PI * y / (1u64 << z) as f64;
    n.sinh().atan().to_degrees()
}

/// Bounds of a possibly out-of-grid column `x`; used for polygons shifted
/// across the antimeridian.
pub(crate) fn tile_rect(z: u8, x: i64, y: i64) -> Rect<f64> {
    let west = tile_x_to_lng(x as f64, z);
    let east = tile_x_to_lng((x + 1) as f64, z);
    let north = tile_y_to_lat(y as f64, z);
    let south = tile_y_to_lat((y + 1) as f64, z);
    Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north })
}
