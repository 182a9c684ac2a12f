//! Attribute statistics over a footprint of cells.
//!
//! The footprint is either a list of H3 cells of any resolution up to the
//! finest one, which are uncompacted to the finest resolution, or a GeoJSON
//! polygon, which is tiled into finest-resolution cells by centroid
//! containment. Either way the expanded footprint is capped.

use crate::attributes::AttributeDocument;
use crate::error::{QueryError, Result};
use crate::filter::{validate_identifier, FilterColumns};
use cellmap_db::schema::CELLS_TABLE;
use cellmap_db::{ancestor_column, quote_identifier, SharedDatabase, SqlValue};
use cellmap_spatial::geometry::{cell_from_str, resolution};
use geo::{Geometry, Polygon};
use geojson::GeoJson;
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::Resolution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Most cells a request may list.
pub const MAX_REQUEST_CELLS: usize = 5000;

/// Most properties a request may ask for.
pub const MAX_REQUEST_PROPERTIES: usize = 5;

/// Default cap on the expanded footprint.
pub const DEFAULT_MAX_FOOTPRINT_CELLS: usize = 250_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Number,
    String,
    Boolean,
}

impl PropertyKind {
    fn as_str(self) -> &'static str {
        match self {
            PropertyKind::Number => "number",
            PropertyKind::String => "string",
            PropertyKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyRequest {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub column: String,
}

/// Body of `POST /stats`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsRequest {
    #[serde(default)]
    pub cells: Option<Vec<String>>,
    /// GeoJSON Feature or Geometry with a Polygon or MultiPolygon.
    #[serde(default)]
    pub feature: Option<serde_json::Value>,
    pub properties: Vec<PropertyRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount<T> {
    pub value: Option<T>,
    pub count: u64,
}

/// Statistics for one requested property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertyStats {
    Number {
        property: String,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
    },
    String {
        property: String,
        counts: Vec<ValueCount<String>>,
    },
    Boolean {
        property: String,
        counts: Vec<ValueCount<bool>>,
    },
}

/// Runs footprint statistics.
#[derive(Debug, Clone)]
pub struct StatsQuery {
    db: SharedDatabase,
    finest: u8,
    max_footprint: usize,
    attributes: Arc<AttributeDocument>,
    columns: Arc<FilterColumns>,
}

impl StatsQuery {
    pub fn new(
        db: SharedDatabase,
        finest: u8,
        attributes: Arc<AttributeDocument>,
        columns: Arc<FilterColumns>,
    ) -> Self {
        Self {
            db,
            finest,
            max_footprint: DEFAULT_MAX_FOOTPRINT_CELLS,
            attributes,
            columns,
        }
    }

    pub fn with_max_footprint(mut self, max_footprint: usize) -> Self {
        self.max_footprint = max_footprint;
        self
    }

    pub async fn run(&self, request: &StatsRequest) -> Result<Vec<PropertyStats>> {
        self.check_properties(&request.properties)?;
        let footprint = self.footprint(request)?;
        tracing::debug!(
            cells = footprint.len(),
            properties = request.properties.len(),
            "computing footprint statistics"
        );

        let mut results = Vec::with_capacity(request.properties.len());
        for property in &request.properties {
            results.push(self.property_stats(property, &footprint).await?);
        }
        Ok(results)
    }

    fn check_properties(&self, properties: &[PropertyRequest]) -> Result<()> {
        if properties.is_empty() || properties.len() > MAX_REQUEST_PROPERTIES {
            return Err(QueryError::validation(format!(
                "properties must list between 1 and {MAX_REQUEST_PROPERTIES} entries"
            )));
        }
        for property in properties {
            if validate_identifier(&property.column).is_err() {
                return Err(QueryError::validation(format!(
                    "invalid property column '{}'",
                    property.column
                )));
            }
            if !self.attributes.contains(&property.column) || !self.columns.contains(&property.column)
            {
                return Err(QueryError::not_found(format!(
                    "Attribute {} not found",
                    property.column
                )));
            }
            if let Some(kind) = self.attributes.kind(&property.column) {
                if kind != property.kind.as_str() && kind != "mixed" {
                    return Err(QueryError::validation(format!(
                        "attribute {} has type {kind}, not {}",
                        property.column,
                        property.kind.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Finest-resolution cell ids of the request footprint, sorted.
    pub fn footprint(&self, request: &StatsRequest) -> Result<Vec<u64>> {
        let finest = resolution(self.finest)?;
        match (&request.cells, &request.feature) {
            (Some(cells), None) => self.uncompact(cells, finest),
            (None, Some(feature)) => self.tile_feature(feature, finest),
            _ => Err(QueryError::validation(
                "exactly one of 'cells' or 'feature' is required",
            )),
        }
    }

    fn uncompact(&self, cells: &[String], finest: Resolution) -> Result<Vec<u64>> {
        if cells.is_empty() || cells.len() > MAX_REQUEST_CELLS {
            return Err(QueryError::validation(format!(
                "cells must list between 1 and {MAX_REQUEST_CELLS} entries"
            )));
        }
        let mut ids = BTreeSet::new();
        for raw in cells {
            let cell = cell_from_str(raw)?;
            if cell.resolution() > finest {
                return Err(QueryError::validation(format!(
                    "cell {raw} is finer than resolution {}",
                    u8::from(finest)
                )));
            }
            let expanded = cell.children_count(finest);
            if ids.len() as u64 + expanded > self.max_footprint as u64 {
                return Err(self.too_large());
            }
            ids.extend(cell.children(finest).map(u64::from));
        }
        Ok(ids.into_iter().collect())
    }

    fn tile_feature(&self, feature: &serde_json::Value, finest: Resolution) -> Result<Vec<u64>> {
        let geojson = GeoJson::from_json_value(feature.clone())
            .map_err(|e| QueryError::validation(format!("invalid GeoJSON feature: {e}")))?;
        let geometry = match geojson {
            GeoJson::Feature(f) => f
                .geometry
                .ok_or_else(|| QueryError::validation("feature has no geometry"))?,
            GeoJson::Geometry(g) => g,
            GeoJson::FeatureCollection(_) => {
                return Err(QueryError::validation(
                    "expected a single Feature or Geometry, not a FeatureCollection",
                ))
            }
        };
        let geometry = Geometry::<f64>::try_from(geometry)
            .map_err(|e| QueryError::validation(format!("invalid GeoJSON geometry: {e}")))?;
        let polygons: Vec<Polygon<f64>> = match geometry {
            Geometry::Polygon(p) => vec![p],
            Geometry::MultiPolygon(mp) => mp.0,
            _ => {
                return Err(QueryError::validation(
                    "feature geometry must be a Polygon or MultiPolygon",
                ))
            }
        };

        let mut tiler = TilerBuilder::new(finest)
            .containment_mode(ContainmentMode::ContainsCentroid)
            .build();
        for polygon in polygons {
            tiler
                .add(polygon)
                .map_err(|e| QueryError::validation(format!("invalid polygon: {e}")))?;
        }
        let ids: BTreeSet<u64> = tiler
            .into_coverage()
            .take(self.max_footprint + 1)
            .map(u64::from)
            .collect();
        if ids.len() > self.max_footprint {
            return Err(self.too_large());
        }
        Ok(ids.into_iter().collect())
    }

    fn too_large(&self) -> QueryError {
        QueryError::validation(format!(
            "footprint exceeds {} cells at resolution {}",
            self.max_footprint, self.finest
        ))
    }

    async fn property_stats(
        &self,
        property: &PropertyRequest,
        footprint: &[u64],
    ) -> Result<PropertyStats> {
        let column = quote_identifier(&property.column);
        let name = property.column.clone();
        if footprint.is_empty() {
            return Ok(match property.kind {
                PropertyKind::Number => PropertyStats::Number {
                    property: name,
                    min: None,
                    max: None,
                    avg: None,
                },
                PropertyKind::String => PropertyStats::String {
                    property: name,
                    counts: Vec::new(),
                },
                PropertyKind::Boolean => PropertyStats::Boolean {
                    property: name,
                    counts: Vec::new(),
                },
            });
        }

        let membership = self.membership(footprint);
        match property.kind {
            PropertyKind::Number => {
                let row = self
                    .db
                    .query_one(
                        &format!(
                            "SELECT min({column})::DOUBLE, max({column})::DOUBLE, avg({column})::DOUBLE \
                             FROM {CELLS_TABLE} WHERE {membership}"
                        ),
                        &[],
                    )
                    .await?;
                Ok(PropertyStats::Number {
                    property: name,
                    min: row.get_opt_f64(0)?,
                    max: row.get_opt_f64(1)?,
                    avg: row.get_opt_f64(2)?,
                })
            }
            PropertyKind::String | PropertyKind::Boolean => {
                let rows = self
                    .db
                    .query(
                        &format!(
                            "SELECT {column}, count(*) FROM {CELLS_TABLE} WHERE {membership} \
                             GROUP BY {column} ORDER BY count(*) DESC, {column}"
                        ),
                        &[],
                    )
                    .await?;
                if property.kind == PropertyKind::String {
                    let counts = rows
                        .iter()
                        .map(|row| {
                            let value = match row.get(0)? {
                                SqlValue::Null => None,
                                SqlValue::Text(s) => Some(s.clone()),
                                other => Some(other.to_string()),
                            };
                            Ok(ValueCount {
                                value,
                                count: row.get_u64(1)?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(PropertyStats::String {
                        property: name,
                        counts,
                    })
                } else {
                    let counts = rows
                        .iter()
                        .map(|row| {
                            let value = match row.get(0)? {
                                SqlValue::Null => None,
                                SqlValue::Bool(b) => Some(*b),
                                other => {
                                    return Err(QueryError::validation(format!(
                                        "column {} is not boolean (found {})",
                                        property.column,
                                        other.type_name()
                                    )))
                                }
                            };
                            Ok(ValueCount {
                                value,
                                count: row.get_u64(1)?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(PropertyStats::Boolean {
                        property: name,
                        counts,
                    })
                }
            }
        }
    }

    /// `r{finest}_id IN (...)` over trusted integer ids.
    fn membership(&self, footprint: &[u64]) -> String {
        let mut clause = format!("{} IN (", ancestor_column(self.finest));
        for (i, id) in footprint.iter().enumerate() {
            if i > 0 {
                clause.push_str(", ");
            }
            let _ = write!(clause, "{id}");
        }
        clause.push(')');
        clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmap_db::{Database, DuckDbDatabase};
    use h3o::{CellIndex, LatLng};
    use serde_json::json;

    fn attributes() -> Arc<AttributeDocument> {
        Arc::new(
            AttributeDocument::from_value(json!({"version": 1, "attributes": [
                {"attribute": "depth", "type": "number"},
                {"attribute": "habitat", "type": "string"},
                {"attribute": "kelp", "type": "boolean"}
            ]}))
            .unwrap(),
        )
    }

    fn parent() -> CellIndex {
        LatLng::new(44.5, -68.2).unwrap().to_cell(Resolution::Nine)
    }

    async fn stats_query() -> StatsQuery {
        let db = DuckDbDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE cells (r11_id UBIGINT, depth DOUBLE, habitat VARCHAR, kelp BOOLEAN)")
            .await
            .unwrap();
        let children: Vec<CellIndex> = parent().children(Resolution::Eleven).collect();
        let habitats = ["kelp", "reef", "kelp"];
        for (i, child) in children.iter().take(3).enumerate() {
            db.execute(
                "INSERT INTO cells VALUES ($1, $2, $3, $4)",
                &[
                    u64::from(*child).into(),
                    ((i as f64 + 1.0) * 10.0).into(),
                    habitats[i].into(),
                    (i != 1).into(),
                ],
            )
            .await
            .unwrap();
        }
        // a row outside the footprint
        let far = LatLng::new(10.0, 10.0).unwrap().to_cell(Resolution::Eleven);
        db.execute(
            "INSERT INTO cells VALUES ($1, 999.0, 'sand', false)",
            &[u64::from(far).into()],
        )
        .await
        .unwrap();

        let columns = Arc::new(FilterColumns::load(&db).await.unwrap());
        StatsQuery::new(Arc::new(db), 11, attributes(), columns)
    }

    fn request(cells: Vec<String>, properties: Vec<(PropertyKind, &str)>) -> StatsRequest {
        StatsRequest {
            cells: Some(cells),
            feature: None,
            properties: properties
                .into_iter()
                .map(|(kind, column)| PropertyRequest {
                    kind,
                    column: column.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_number_and_string_stats_over_uncompacted_cells() {
        let query = stats_query().await;
        let req = request(
            vec![parent().to_string()],
            vec![
                (PropertyKind::Number, "depth"),
                (PropertyKind::String, "habitat"),
                (PropertyKind::Boolean, "kelp"),
            ],
        );
        let results = query.run(&req).await.unwrap();
        assert_eq!(
            results[0],
            PropertyStats::Number {
                property: "depth".into(),
                min: Some(10.0),
                max: Some(30.0),
                avg: Some(20.0),
            }
        );
        assert_eq!(
            results[1],
            PropertyStats::String {
                property: "habitat".into(),
                counts: vec![
                    ValueCount {
                        value: Some("kelp".into()),
                        count: 2
                    },
                    ValueCount {
                        value: Some("reef".into()),
                        count: 1
                    },
                ],
            }
        );
        match &results[2] {
            PropertyStats::Boolean { counts, .. } => {
                assert_eq!(counts[0].value, Some(true));
                assert_eq!(counts[0].count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["property"], "depth");
    }

    #[tokio::test]
    async fn test_unknown_attribute_is_not_found() {
        let query = stats_query().await;
        let req = request(vec![parent().to_string()], vec![(PropertyKind::Number, "salinity")]);
        assert!(matches!(query.run(&req).await, Err(QueryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_request_shape_validation() {
        let query = stats_query().await;
        let mut req = request(vec![], vec![(PropertyKind::Number, "depth")]);
        assert!(matches!(query.run(&req).await, Err(QueryError::Validation(_))));

        req.cells = Some(vec![parent().to_string()]);
        req.feature = Some(json!({"type": "Point", "coordinates": [0.0, 0.0]}));
        assert!(matches!(query.run(&req).await, Err(QueryError::Validation(_))));

        let too_many = request(
            vec![parent().to_string()],
            vec![(PropertyKind::Number, "depth"); 6],
        );
        assert!(matches!(query.run(&too_many).await, Err(QueryError::Validation(_))));

        let wrong_type = request(vec![parent().to_string()], vec![(PropertyKind::Number, "habitat")]);
        assert!(matches!(query.run(&wrong_type).await, Err(QueryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_footprint_cap() {
        let query = stats_query().await.with_max_footprint(10);
        // one res-9 cell has 49 res-11 children
        let req = request(vec![parent().to_string()], vec![(PropertyKind::Number, "depth")]);
        let err = query.footprint(&req).unwrap_err();
        assert!(err.to_string().contains("footprint exceeds"), "{err}");
    }

    #[tokio::test]
    async fn test_polygon_footprint() {
        let query = stats_query().await;
        let center = LatLng::from(parent());
        let d = 0.01;
        let (x, y) = (center.lng(), center.lat());
        let feature = json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[
                [x - d, y - d], [x + d, y - d], [x + d, y + d], [x - d, y + d], [x - d, y - d]
            ]]}
        });
        let req = StatsRequest {
            cells: None,
            feature: Some(feature),
            properties: vec![PropertyRequest {
                kind: PropertyKind::Number,
                column: "depth".into(),
            }],
        };
        let footprint = query.footprint(&req).unwrap();
        assert!(!footprint.is_empty());
        let center_cell = center.to_cell(Resolution::Eleven);
        assert!(footprint.contains(&u64::from(center_cell)));
        assert!(query.run(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_reserved_word_property() {
        let db = DuckDbDatabase::open_in_memory().unwrap();
        db.execute_batch(r#"CREATE TABLE cells (r11_id UBIGINT, "order" VARCHAR)"#)
            .await
            .unwrap();
        for child in parent().children(Resolution::Eleven).take(2) {
            db.execute("INSERT INTO cells VALUES ($1, 'kelp')", &[u64::from(child).into()])
                .await
                .unwrap();
        }
        let attributes = Arc::new(
            AttributeDocument::from_value(json!({"version": 1, "attributes": [
                {"attribute": "order", "type": "string"}
            ]}))
            .unwrap(),
        );
        let columns = Arc::new(FilterColumns::load(&db).await.unwrap());
        let query = StatsQuery::new(Arc::new(db), 11, attributes, columns);

        let req = request(vec![parent().to_string()], vec![(PropertyKind::String, "order")]);
        let results = query.run(&req).await.unwrap();
        assert_eq!(
            results[0],
            PropertyStats::String {
                property: "order".into(),
                counts: vec![ValueCount {
                    value: Some("kelp".into()),
                    count: 2
                }],
            }
        );
    }

    #[tokio::test]
    async fn test_finer_cell_is_rejected() {
        let query = stats_query().await;
        let fine = LatLng::new(44.5, -68.2).unwrap().to_cell(Resolution::Twelve);
        let req = request(vec![fine.to_string()], vec![(PropertyKind::Number, "depth")]);
        assert!(matches!(query.footprint(&req), Err(QueryError::Validation(_))));
    }
}
