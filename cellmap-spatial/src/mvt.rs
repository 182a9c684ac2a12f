//! Mapbox Vector Tile encoding.
//!
//! Polygons are projected into tile space (`extent` units per tile edge, y
//! pointing south), clipped to the tile grown by `buffer` units on each side,
//! and written as a single layer. Features that do not reach the unbuffered
//! tile are dropped, which removes the false positives of candidate pruning.

use crate::features::{CellFeature, PropertyValue};
use crate::tile::{lat_to_tile_y, lng_to_tile_x, TileId};
use bytes::Bytes;
use geo::Coord;
use geozero::mvt::tile::{Feature, GeomType, Layer, Value};
use geozero::mvt::{Message as _, Tile};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Name of the only layer in every tile.
pub const LAYER_NAME: &str = "cells";

/// Tile extent in tile units.
pub const DEFAULT_EXTENT: u32 = 4096;

/// Clip buffer in tile units.
pub const DEFAULT_BUFFER: u32 = 64;

const MVT_VERSION: u32 = 2;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

type Point = [f64; 2];

/// Encodes feature lists into MVT buffers.
#[derive(Debug, Clone)]
pub struct TileEncoder {
    extent: u32,
    buffer: u32,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self {
            extent: DEFAULT_EXTENT,
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl TileEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `features` as the `cells` layer of `tile`.
    pub fn encode(&self, tile: TileId, features: &[CellFeature]) -> Bytes {
        let mut layer = LayerBuilder::new(self.extent);
        for feature in features {
            if let Some(geometry) = self.feature_geometry(tile, feature) {
                layer.push(geometry, &feature.properties);
            }
        }
        let kept = layer.features.len();
        let bytes = Bytes::from(layer.finish().encode_to_vec());
        tracing::trace!(tile = %tile, input = features.len(), kept, bytes = bytes.len(), "encoded tile");
        bytes
    }

    /// Exterior ring of `feature` as MVT geometry commands, or `None` when it
    /// misses the tile.
    fn feature_geometry(&self, tile: TileId, feature: &CellFeature) -> Option<Vec<u32>> {
        let ring = &feature.polygon.exterior().0;

        // Antimeridian-shifted rings are rendered a world to the west on
        // tiles of the western hemisphere. The world tile holds both halves.
        let crosses = ring.iter().any(|c| c.x > 180.0);
        let half = (1u32 << tile.z) / 2;
        let shifts: &[f64] = if !crosses {
            &[0.0]
        } else if tile.z == 0 {
            &[0.0, -360.0]
        } else if tile.x < half {
            &[-360.0]
        } else {
            &[0.0]
        };

        let rings: Vec<Vec<[i64; 2]>> = shifts
            .iter()
            .filter_map(|shift| self.tile_ring(tile, ring, *shift))
            .collect();
        if rings.is_empty() {
            return None;
        }
        Some(ring_commands(&rings))
    }

    /// Project `ring` shifted by `shift` degrees into tile space, clip it and
    /// quantize it with exterior winding.
    fn tile_ring(&self, tile: TileId, ring: &[Coord<f64>], shift: f64) -> Option<Vec<[i64; 2]>> {
        let extent = f64::from(self.extent);
        let mut projected: Vec<Point> = ring
            .iter()
            .map(|c| {
                [
                    (lng_to_tile_x(c.x + shift, tile.z) - f64::from(tile.x)) * extent,
                    (lat_to_tile_y(c.y, tile.z) - f64::from(tile.y)) * extent,
                ]
            })
            .collect();
        if projected.len() > 1 && projected.first() == projected.last() {
            projected.pop();
        }

        let buffer = f64::from(self.buffer);
        let clipped = clip_ring(&projected, -buffer, extent + buffer);
        let inner = clip_ring(&clipped, 0.0, extent);
        if inner.len() < 3 || signed_area(&inner) == 0.0 {
            return None;
        }

        let mut quantized: Vec<[i64; 2]> = Vec::with_capacity(clipped.len());
        for p in &clipped {
            let q = [p[0].round() as i64, p[1].round() as i64];
            if quantized.last() != Some(&q) {
                quantized.push(q);
            }
        }
        while quantized.len() > 1 && quantized.first() == quantized.last() {
            quantized.pop();
        }
        if quantized.len() < 3 {
            return None;
        }
        let area = integer_area(&quantized);
        if area == 0 {
            return None;
        }
        // Exterior rings have positive surveyor's area in tile space.
        if area < 0 {
            quantized.reverse();
        }
        Some(quantized)
    }
}

/// Precomputed tile with an empty `cells` layer.
pub fn empty_tile() -> Bytes {
    static EMPTY: OnceLock<Bytes> = OnceLock::new();
    EMPTY
        .get_or_init(|| Bytes::from(LayerBuilder::new(DEFAULT_EXTENT).finish().encode_to_vec()))
        .clone()
}

struct LayerBuilder {
    extent: u32,
    keys: Vec<String>,
    key_index: HashMap<&'static str, u32>,
    values: Vec<Value>,
    value_index: HashMap<ValueKey, u32>,
    features: Vec<Feature>,
}

#[derive(Hash, PartialEq, Eq)]
enum ValueKey {
    Bool(bool),
    UInt(u64),
    Double(u64),
    String(String),
}

impl LayerBuilder {
    fn new(extent: u32) -> Self {
        Self {
            extent,
            keys: Vec::new(),
            key_index: HashMap::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
            features: Vec::new(),
        }
    }

    fn push(&mut self, geometry: Vec<u32>, properties: &[(&'static str, PropertyValue)]) {
        let mut tags = Vec::with_capacity(properties.len() * 2);
        for (key, value) in properties {
            let k = self.key(key);
            let v = self.value(value);
            tags.push(k);
            tags.push(v);
        }
        self.features.push(Feature {
            id: None,
            tags,
            r#type: Some(GeomType::Polygon as i32),
            geometry,
        });
    }

    fn key(&mut self, key: &'static str) -> u32 {
        if let Some(&i) = self.key_index.get(key) {
            return i;
        }
        let i = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_index.insert(key, i);
        i
    }

    fn value(&mut self, value: &PropertyValue) -> u32 {
        let key = match value {
            PropertyValue::Bool(b) => ValueKey::Bool(*b),
            PropertyValue::UInt(u) => ValueKey::UInt(*u),
            PropertyValue::Double(d) => ValueKey::Double(d.to_bits()),
            PropertyValue::String(s) => ValueKey::String(s.clone()),
        };
        if let Some(&i) = self.value_index.get(&key) {
            return i;
        }
        let mut encoded = Value::default();
        match value {
            PropertyValue::Bool(b) => encoded.bool_value = Some(*b),
            PropertyValue::UInt(u) => encoded.uint_value = Some(*u),
            PropertyValue::Double(d) => encoded.double_value = Some(*d),
            PropertyValue::String(s) => encoded.string_value = Some(s.clone()),
        }
        let i = self.values.len() as u32;
        self.values.push(encoded);
        self.value_index.insert(key, i);
        i
    }

    fn finish(self) -> Tile {
        Tile {
            layers: vec![Layer {
                version: MVT_VERSION,
                name: LAYER_NAME.to_string(),
                features: self.features,
                keys: self.keys,
                values: self.values,
                extent: Some(self.extent),
            }],
        }
    }
}

/// Sutherland–Hodgman clip of an open ring against the square `[min, max]^2`.
fn clip_ring(ring: &[Point], min: f64, max: f64) -> Vec<Point> {
    let mut out = ring.to_vec();
    for (axis, bound, keep_above) in [(0, min, true), (0, max, false), (1, min, true), (1, max, false)]
    {
        out = clip_edge(&out, axis, bound, keep_above);
        if out.is_empty() {
            break;
        }
    }
    out
}

fn clip_edge(ring: &[Point], axis: usize, bound: f64, keep_above: bool) -> Vec<Point> {
    let inside = |p: &Point| {
        if keep_above {
            p[axis] >= bound
        } else {
            p[axis] <= bound
        }
    };
    let crossing = |a: &Point, b: &Point| {
        let t = (bound - a[axis]) / (b[axis] - a[axis]);
        [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])]
    };

    let mut out = Vec::with_capacity(ring.len() + 4);
    let Some(mut prev) = ring.last() else {
        return out;
    };
    for cur in ring {
        match (inside(prev), inside(cur)) {
            (true, true) => out.push(*cur),
            (true, false) => out.push(crossing(prev, cur)),
            (false, true) => {
                out.push(crossing(prev, cur));
                out.push(*cur);
            }
            (false, false) => {}
        }
        prev = cur;
    }
    out
}

fn signed_area(ring: &[Point]) -> f64 {
    let mut sum = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = &ring[(i + 1) % ring.len()];
        sum += a[0] * b[1] - b[0] * a[1];
    }
    sum / 2.0
}

fn integer_area(ring: &[[i64; 2]]) -> i64 {
    let mut sum = 0;
    for (i, a) in ring.iter().enumerate() {
        let b = &ring[(i + 1) % ring.len()];
        sum += a[0] * b[1] - b[0] * a[1];
    }
    sum
}

fn command(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

fn zigzag(n: i64) -> u32 {
    ((n << 1) ^ (n >> 63)) as u32
}

/// MoveTo, LineTo and ClosePath commands for closed exterior rings. The
/// cursor carries over from one ring to the next.
fn ring_commands(rings: &[Vec<[i64; 2]>]) -> Vec<u32> {
    let mut out = Vec::new();
    let mut cursor = [0i64; 2];
    for ring in rings {
        out.push(command(CMD_MOVE_TO, 1));
        for (i, p) in ring.iter().enumerate() {
            if i == 1 {
                out.push(command(CMD_LINE_TO, (ring.len() - 1) as u32));
            }
            out.push(zigzag(p[0] - cursor[0]));
            out.push(zigzag(p[1] - cursor[1]));
            cursor = *p;
        }
        out.push(command(CMD_CLOSE_PATH, 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{cells_to_features, CellCount};
    use crate::tile::MAX_LATITUDE;
    use geo::{coord, Rect};
    use geozero::mvt::Message;
    use h3o::{LatLng, Resolution};

    fn decode(bytes: &[u8]) -> Tile {
        Tile::decode(bytes).unwrap()
    }

    fn rect_feature(west: f64, south: f64, east: f64, north: f64) -> CellFeature {
        CellFeature {
            polygon: Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north })
                .to_polygon(),
            properties: vec![("count", PropertyValue::UInt(1))],
        }
    }

    #[test]
    fn test_empty_tile_is_stable() {
        let a = empty_tile();
        let b = empty_tile();
        assert_eq!(a, b);
        let tile = decode(&a);
        assert_eq!(tile.layers.len(), 1);
        assert_eq!(tile.layers[0].name, LAYER_NAME);
        assert!(tile.layers[0].features.is_empty());
        assert_eq!(tile.layers[0].extent, Some(DEFAULT_EXTENT));
    }

    #[test]
    fn test_no_features_encodes_empty_tile() {
        let tile = TileId::new(3, 1, 1).unwrap();
        assert_eq!(TileEncoder::new().encode(tile, &[]), empty_tile());
    }

    #[test]
    fn test_feature_outside_tile_is_dropped() {
        // zoom-1 north-west tile; feature in the south-east quadrant
        let tile = TileId::new(1, 0, 0).unwrap();
        let encoded = TileEncoder::new().encode(tile, &[rect_feature(10.0, -20.0, 20.0, -10.0)]);
        assert_eq!(encoded, empty_tile());
    }

    #[test]
    fn test_feature_only_in_buffer_is_dropped() {
        let encoder = TileEncoder::new();
        // just east of the zoom-1 north-west tile, inside its buffer
        let sliver = rect_feature(0.1, 10.0, 0.5, 20.0);
        let north_west = TileId::new(1, 0, 0).unwrap();
        assert_eq!(encoder.encode(north_west, &[sliver.clone()]), empty_tile());
        let world = TileId::new(0, 0, 0).unwrap();
        assert_ne!(encoder.encode(world, &[sliver]), empty_tile());
    }

    #[test]
    fn test_polygon_geometry_and_winding() {
        let tile = TileId::new(0, 0, 0).unwrap();
        let encoded = TileEncoder::new().encode(tile, &[rect_feature(-90.0, -45.0, 90.0, 45.0)]);
        let decoded = decode(&encoded);
        let layer = &decoded.layers[0];
        assert_eq!(layer.features.len(), 1);
        let feature = &layer.features[0];
        assert_eq!(feature.r#type, Some(GeomType::Polygon as i32));
        assert_eq!(layer.keys, vec!["count".to_string()]);
        assert_eq!(layer.values[0].uint_value, Some(1));
        assert_eq!(feature.tags, vec![0, 0]);

        let geometry = &feature.geometry;
        assert_eq!(geometry[0], command(CMD_MOVE_TO, 1));
        assert_eq!(geometry[3], command(CMD_LINE_TO, 3));
        assert_eq!(*geometry.last().unwrap(), command(CMD_CLOSE_PATH, 1));

        let ring = decode_ring(geometry);
        assert_eq!(ring.len(), 4);
        assert!(integer_area(&ring) > 0);
        for p in &ring {
            assert!(p[0] == 1024 || p[0] == 3072);
        }
    }

    #[test]
    fn test_clipping_to_buffer() {
        // a polygon covering the whole world, rendered on a zoom-2 tile
        let tile = TileId::new(2, 1, 1).unwrap();
        let world = rect_feature(-179.0, -MAX_LATITUDE + 1.0, 179.0, MAX_LATITUDE - 1.0);
        let encoded = TileEncoder::new().encode(tile, &[world]);
        let ring = decode_ring(&decode(&encoded).layers[0].features[0].geometry);
        for p in &ring {
            assert!((-64..=4160).contains(&p[0]), "{p:?}");
            assert!((-64..=4160).contains(&p[1]), "{p:?}");
        }
    }

    #[test]
    fn test_shared_values_are_deduplicated() {
        let tile = TileId::new(0, 0, 0).unwrap();
        let features = vec![
            rect_feature(-10.0, -10.0, 10.0, 10.0),
            rect_feature(20.0, 20.0, 30.0, 30.0),
        ];
        let decoded = decode(&TileEncoder::new().encode(tile, &features));
        let layer = &decoded.layers[0];
        assert_eq!(layer.features.len(), 2);
        assert_eq!(layer.keys.len(), 1);
        assert_eq!(layer.values.len(), 1);
    }

    #[test]
    fn test_hex_cells_encode() {
        let ll = LatLng::new(44.5, -68.2).unwrap();
        let cell = ll.to_cell(Resolution::Four);
        let features = cells_to_features(
            4,
            &[CellCount {
                cell,
                count: 5,
                total: None,
            }],
        );
        let z = 5;
        let tile = TileId::new(
            z,
            lng_to_tile_x(ll.lng(), z) as u32,
            lat_to_tile_y(ll.lat(), z) as u32,
        )
        .unwrap();
        let decoded = decode(&TileEncoder::new().encode(tile, &features));
        let layer = &decoded.layers[0];
        assert_eq!(layer.features.len(), 1);
        assert!(layer.keys.contains(&"h3".to_string()));
        assert!(layer
            .values
            .iter()
            .any(|v| v.string_value.as_deref() == Some(cell.to_string().as_str())));
    }

    #[test]
    fn test_antimeridian_cell_renders_on_both_edges() {
        let feature = rect_feature(179.0, 1.0, 181.0, 2.0);
        let encoder = TileEncoder::new();
        let east = TileId::new(1, 1, 0).unwrap();
        let west = TileId::new(1, 0, 0).unwrap();
        assert_ne!(encoder.encode(east, &[feature.clone()]), empty_tile());
        assert_ne!(encoder.encode(west, &[feature]), empty_tile());
    }

    #[test]
    fn test_world_tile_keeps_both_halves_of_split_cell() {
        // first res-2 cell near the antimeridian whose ring is shifted past 180
        let cell = (0..100)
            .map(|i| LatLng::new(10.0, 179.0 + f64::from(i) * 0.01).unwrap())
            .map(|ll| ll.to_cell(Resolution::Two))
            .find(|c| crate::geometry::cell_polygon(*c).exterior().0.iter().any(|p| p.x > 180.0))
            .expect("a res-2 cell straddles the antimeridian near lat 10");
        let features = cells_to_features(
            2,
            &[CellCount {
                cell,
                count: 1,
                total: None,
            }],
        );
        let world = TileId::new(0, 0, 0).unwrap();
        let decoded = decode(&TileEncoder::new().encode(world, &features));
        let geometry = &decoded.layers[0].features[0].geometry;
        let mut move_tos = 0;
        let mut i = 0;
        while i < geometry.len() {
            let (id, count) = (geometry[i] & 0x7, geometry[i] >> 3);
            if id == CMD_MOVE_TO {
                move_tos += 1;
            }
            i += 1 + if id == CMD_CLOSE_PATH { 0 } else { 2 * count as usize };
        }
        assert_eq!(move_tos, 2, "east and west halves");
        let ring = decode_ring(geometry);
        assert!(ring.iter().any(|p| p[0] < 64), "west edge piece");
        assert!(ring.iter().any(|p| p[0] > 4032), "east edge piece");
    }

    fn decode_ring(geometry: &[u32]) -> Vec<[i64; 2]> {
        let unzig = |v: u32| ((v >> 1) as i64) ^ -((v & 1) as i64);
        let mut cursor = [0i64; 2];
        let mut ring = Vec::new();
        let mut i = 0;
        while i < geometry.len() {
            let id = geometry[i] & 0x7;
            let count = geometry[i] >> 3;
            i += 1;
            if id == CMD_CLOSE_PATH {
                continue;
            }
            for _ in 0..count {
                cursor[0] += unzig(geometry[i]);
                cursor[1] += unzig(geometry[i + 1]);
                ring.push(cursor);
                i += 2;
            }
        }
        ring
    }
}
