//! Aggregated cell rows to polygon features.

use crate::geometry::cell_polygon;
use geo::Polygon;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use h3o::CellIndex;
use serde_json::Value as JsonValue;

/// Aggregated count for one cell of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCount {
    pub cell: CellIndex,
    /// Fact rows matching the filter.
    pub count: u64,
    /// All fact rows of the cell; only set in fraction mode.
    pub total: Option<u64>,
}

/// A feature property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    UInt(u64),
    Double(f64),
    String(String),
}

impl From<&PropertyValue> for JsonValue {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(b) => JsonValue::Bool(*b),
            PropertyValue::UInt(u) => JsonValue::from(*u),
            PropertyValue::Double(d) => JsonValue::from(*d),
            PropertyValue::String(s) => JsonValue::String(s.clone()),
        }
    }
}

/// A polygon with ordered properties, in (lng, lat) degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct CellFeature {
    pub polygon: Polygon<f64>,
    pub properties: Vec<(&'static str, PropertyValue)>,
}

impl CellFeature {
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn to_geojson(&self) -> Feature {
        let mut properties = JsonObject::new();
        for (key, value) in &self.properties {
            properties.insert((*key).to_string(), JsonValue::from(value));
        }
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::from(&self.polygon))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// One feature per row with `h3`, `count`, `resolution` and `highlighted`
/// properties, plus `totalCount` and `fraction` when the row carries a total.
pub fn cells_to_features(resolution: u8, rows: &[CellCount]) -> Vec<CellFeature> {
    rows.iter()
        .map(|row| {
            let mut properties = vec![
                ("h3", PropertyValue::String(row.cell.to_string())),
                ("count", PropertyValue::UInt(row.count)),
                ("resolution", PropertyValue::UInt(u64::from(resolution))),
                ("highlighted", PropertyValue::Bool(row.count > 0)),
            ];
            if let Some(total) = row.total {
                let fraction = if total == 0 {
                    0.0
                } else {
                    row.count as f64 / total as f64
                };
                properties.push(("totalCount", PropertyValue::UInt(total)));
                properties.push(("fraction", PropertyValue::Double(fraction)));
            }
            CellFeature {
                polygon: cell_polygon(row.cell),
                properties,
            }
        })
        .collect()
}

/// Unclipped GeoJSON rendition of a tile.
pub fn to_feature_collection(features: &[CellFeature]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: features.iter().map(CellFeature::to_geojson).collect(),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3o::{LatLng, Resolution};

    fn cell() -> CellIndex {
        LatLng::new(44.5, -68.2).unwrap().to_cell(Resolution::Seven)
    }

    #[test]
    fn test_plain_feature_properties() {
        let features = cells_to_features(
            7,
            &[CellCount {
                cell: cell(),
                count: 3,
                total: None,
            }],
        );
        assert_eq!(features.len(), 1);
        let f = &features[0];
        assert_eq!(
            f.property("h3"),
            Some(&PropertyValue::String(cell().to_string()))
        );
        assert_eq!(f.property("count"), Some(&PropertyValue::UInt(3)));
        assert_eq!(f.property("highlighted"), Some(&PropertyValue::Bool(true)));
        assert!(f.property("fraction").is_none());
    }

    #[test]
    fn test_fraction_mode_properties() {
        let features = cells_to_features(
            7,
            &[
                CellCount {
                    cell: cell(),
                    count: 1,
                    total: Some(4),
                },
                CellCount {
                    cell: cell(),
                    count: 0,
                    total: Some(2),
                },
            ],
        );
        assert_eq!(features[0].property("fraction"), Some(&PropertyValue::Double(0.25)));
        assert_eq!(features[0].property("totalCount"), Some(&PropertyValue::UInt(4)));
        assert_eq!(features[1].property("highlighted"), Some(&PropertyValue::Bool(false)));
        assert_eq!(features[1].property("fraction"), Some(&PropertyValue::Double(0.0)));
    }

    #[test]
    fn test_feature_collection_json() {
        let features = cells_to_features(
            7,
            &[CellCount {
                cell: cell(),
                count: 2,
                total: None,
            }],
        );
        let json = serde_json::to_value(to_feature_collection(&features)).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        let feature = &json["features"][0];
        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert_eq!(feature["properties"]["count"], 2);
        assert_eq!(feature["properties"]["resolution"], 7);
        assert_eq!(feature["properties"]["h3"], cell().to_string());
    }
}
