//! Zoom-to-resolution stop table.
//!
//! A [`Stop`] binds a contiguous zoom range to the H3 resolution rendered at
//! those zooms and to the quadkey precision its coverage index is built at.
//! A [`StopTable`] is only constructed through [`StopTable::new`], which
//! checks that the stops partition `0..=max_zoom` with no gaps or overlaps.

use crate::error::{Result, SpatialError};
use serde::{Deserialize, Serialize};

/// Highest quadkey precision the coverage index supports.
pub const MAX_PRECISION: u8 = 24;

/// Highest H3 resolution.
pub const MAX_RESOLUTION: u8 = 15;

/// One zoom range of the stop table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    /// First zoom served by this stop (inclusive).
    pub min_zoom: u8,
    /// Last zoom served by this stop (inclusive).
    pub max_zoom: u8,
    /// H3 resolution of the cells rendered at these zooms.
    pub resolution: u8,
    /// Quadkey length of the index entries built for this resolution.
    pub index_precision: u8,
}

impl Stop {
    pub const fn new(min_zoom: u8, max_zoom: u8, resolution: u8, index_precision: u8) -> Self {
        Self {
            min_zoom,
            max_zoom,
            resolution,
            index_precision,
        }
    }

    /// True if `zoom` falls inside this stop's range.
    pub fn contains(&self, zoom: u8) -> bool {
        self.min_zoom <= zoom && zoom <= self.max_zoom
    }
}

/// Production stop table.
pub const DEFAULT_STOPS: [Stop; 8] = [
    Stop::new(0, 5, 4, 5),
    Stop::new(6, 7, 5, 7),
    Stop::new(8, 8, 6, 8),
    Stop::new(9, 9, 7, 9),
    Stop::new(10, 10, 8, 10),
    Stop::new(11, 12, 9, 12),
    Stop::new(13, 13, 10, 13),
    Stop::new(14, 16, 11, 16),
];

/// Validated, zoom-ordered stop table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Stop>", into = "Vec<Stop>")]
pub struct StopTable {
    stops: Vec<Stop>,
}

impl StopTable {
    /// Validate and build a stop table. Stops may be given in any order.
    pub fn new(mut stops: Vec<Stop>) -> Result<Self> {
        if stops.is_empty() {
            return Err(SpatialError::config("stop table is empty"));
        }
        stops.sort_by_key(|s| s.min_zoom);

        let mut expected_min = 0u16;
        let mut seen_resolutions = Vec::with_capacity(stops.len());
        for stop in &stops {
            if stop.min_zoom > stop.max_zoom {
                return Err(SpatialError::config(format!(
                    "stop for resolution {} has min_zoom {} above max_zoom {}",
                    stop.resolution, stop.min_zoom, stop.max_zoom
                )));
            }
            if u16::from(stop.min_zoom) != expected_min {
                let kind = if u16::from(stop.min_zoom) > expected_min {
                    "gap"
                } else {
                    "overlap"
                };
                return Err(SpatialError::config(format!(
                    "stop table has a {kind} at zoom {}",
                    expected_min.min(u16::from(stop.min_zoom))
                )));
            }
            if stop.resolution > MAX_RESOLUTION {
                return Err(SpatialError::config(format!(
                    "resolution {} is not a valid H3 resolution",
                    stop.resolution
                )));
            }
            if stop.index_precision == 0 || stop.index_precision > MAX_PRECISION {
                return Err(SpatialError::config(format!(
                    "index precision {} for resolution {} is outside 1..={MAX_PRECISION}",
                    stop.index_precision, stop.resolution
                )));
            }
            if seen_resolutions.contains(&stop.resolution) {
                return Err(SpatialError::config(format!(
                    "resolution {} appears in more than one stop",
                    stop.resolution
                )));
            }
            if stop.index_precision < stop.max_zoom {
                tracing::warn!(
                    resolution = stop.resolution,
                    precision = stop.index_precision,
                    max_zoom = stop.max_zoom,
                    "index precision below max zoom; deep tiles use ancestor matching"
                );
            }
            seen_resolutions.push(stop.resolution);
            expected_min = u16::from(stop.max_zoom) + 1;
        }

        Ok(Self { stops })
    }

    /// Resolution of the unique stop covering `zoom`.
    pub fn resolution_for_zoom(&self, zoom: u8) -> Result<u8> {
        self.stop_for_zoom(zoom).map(|s| s.resolution)
    }

    /// The unique stop covering `zoom`.
    pub fn stop_for_zoom(&self, zoom: u8) -> Result<&Stop> {
        self.stops.iter().find(|s| s.contains(zoom)).ok_or_else(|| {
            SpatialError::config(format!(
                "no stop covers zoom {zoom} (supported zooms are 0..={})",
                self.max_zoom()
            ))
        })
    }

    /// The stop rendering `resolution`, if any.
    pub fn stop_for_resolution(&self, resolution: u8) -> Option<&Stop> {
        self.stops.iter().find(|s| s.resolution == resolution)
    }

    /// The stop with the finest resolution.
    pub fn finest(&self) -> &Stop {
        // `new` rejects empty tables.
        self.stops
            .iter()
            .max_by_key(|s| s.resolution)
            .unwrap_or(&self.stops[0])
    }

    /// Stops ordered from finest to coarsest resolution.
    pub fn iter_finest_first(&self) -> impl Iterator<Item = &Stop> {
        let mut ordered: Vec<&Stop> = self.stops.iter().collect();
        ordered.sort_by(|a, b| b.resolution.cmp(&a.resolution));
        ordered.into_iter()
    }

    /// Stops in zoom order.
    pub fn iter(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter()
    }

    /// Highest zoom any stop covers.
    pub fn max_zoom(&self) -> u8 {
        self.stops.last().map(|s| s.max_zoom).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

impl Default for StopTable {
    fn default() -> Self {
        Self {
            stops: DEFAULT_STOPS.to_vec(),
        }
    }
}

impl TryFrom<Vec<Stop>> for StopTable {
    type Error = SpatialError;

    fn try_from(stops: Vec<Stop>) -> Result<Self> {
        Self::new(stops)
    }
}

impl From<StopTable> for Vec<Stop> {
    fn from(table: StopTable) -> Self {
        table.stops
    }
}
