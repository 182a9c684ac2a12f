//! Tile queries against a freshly rebuilt coverage index.

use cellmap_db::{Database, DuckDbDatabase, SharedDatabase};
use cellmap_query::{FilterColumns, FilterSpec, QueryError, TileQueryEngine, TileRequest};
use cellmap_spatial::tile::{lat_to_tile_y, lng_to_tile_x};
use cellmap_spatial::{
    cell_polygon, cells_to_features, cover_tiles, empty_tile, GeohashIndexBuilder, IndexCatalog,
    NoopObserver, Stop, StopTable, TileEncoder, TileId,
};
use geo::BoundingRect;
use h3o::{CellIndex, LatLng, Resolution};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

const POINT: (f64, f64) = (44.5, -68.2);

fn stops() -> StopTable {
    StopTable::new(vec![Stop::new(0, 5, 4, 5), Stop::new(6, 12, 7, 9)]).unwrap()
}

fn tile_at(z: u8, lat: f64, lng: f64) -> TileId {
    TileId::new(z, lng_to_tile_x(lng, z) as u32, lat_to_tile_y(lat, z) as u32).unwrap()
}

/// Three fact rows in one res-7 cell near `POINT`, one row far away.
async fn setup() -> (SharedDatabase, CellIndex) {
    let db = DuckDbDatabase::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE cells (r4_id UBIGINT, r7_id UBIGINT, depth DOUBLE, kelp BOOLEAN)")
        .await
        .unwrap();
    let cell = LatLng::new(POINT.0, POINT.1).unwrap().to_cell(Resolution::Seven);
    let far = LatLng::new(-33.9, 151.2).unwrap().to_cell(Resolution::Seven);
    for (c, depth, kelp) in [(cell, 5.0, true), (cell, 40.0, false), (cell, 80.0, true), (far, 10.0, true)] {
        let parent = c.parent(Resolution::Four).unwrap();
        db.execute(
            "INSERT INTO cells VALUES ($1, $2, $3, $4)",
            &[u64::from(parent).into(), u64::from(c).into(), depth.into(), kelp.into()],
        )
        .await
        .unwrap();
    }
    let db: SharedDatabase = Arc::new(db);
    let report = GeohashIndexBuilder::new(db.clone(), stops())
        .rebuild(&mut NoopObserver)
        .await
        .unwrap();
    assert!(report.is_complete());
    (db, cell)
}

async fn engine(db: &SharedDatabase) -> TileQueryEngine {
    let catalog = IndexCatalog::load(db.as_ref()).await.unwrap();
    let columns = FilterColumns::load(db.as_ref()).await.unwrap();
    TileQueryEngine::new(db.clone(), Arc::new(stops()), Arc::new(catalog), Arc::new(columns))
}

#[tokio::test]
async fn tile_containing_cell_returns_it() {
    let (db, cell) = setup().await;
    let engine = engine(&db).await;
    for z in 6..=9 {
        let rows = engine
            .query(&TileRequest::new(tile_at(z, POINT.0, POINT.1)))
            .await
            .unwrap();
        assert_eq!(rows.resolution, 7);
        assert_eq!(rows.rows.len(), 1, "zoom {z}");
        assert_eq!(rows.rows[0].cell, cell);
        assert_eq!(rows.rows[0].count, 3);
    }
}

#[tokio::test]
async fn tile_deeper_than_precision_uses_ancestor_cover() {
    let (db, cell) = setup().await;
    let engine = engine(&db).await;
    let rows = engine
        .query(&TileRequest::new(tile_at(12, POINT.0, POINT.1)))
        .await
        .unwrap();
    assert!(rows.rows.iter().any(|r| r.cell == cell));
}

#[tokio::test]
async fn filter_and_fraction() {
    let (db, cell) = setup().await;
    let engine = engine(&db).await;
    let tile = tile_at(8, POINT.0, POINT.1);

    let deep = FilterSpec::from_json(&json!({"depth": {"min": 30}})).unwrap();
    let rows = engine
        .query(&TileRequest::new(tile).with_filter(deep.clone()))
        .await
        .unwrap();
    assert_eq!(rows.rows[0].count, 2);
    assert_eq!(rows.rows[0].total, None);

    let rows = engine
        .query(&TileRequest::new(tile).with_filter(deep).with_fraction(true))
        .await
        .unwrap();
    assert_eq!(rows.rows[0].count, 2);
    assert_eq!(rows.rows[0].total, Some(3));

    let none = FilterSpec::from_json(&json!({"depth": {"min": 1000}})).unwrap();
    let plain = engine
        .query(&TileRequest::new(tile).with_filter(none.clone()))
        .await
        .unwrap();
    assert!(plain.rows.is_empty());
    let fraction = engine
        .query(&TileRequest::new(tile).with_filter(none).with_fraction(true))
        .await
        .unwrap();
    assert_eq!(fraction.rows.len(), 1);
    assert_eq!(fraction.rows[0].cell, cell);
    assert_eq!(fraction.rows[0].count, 0);
}

#[tokio::test]
async fn empty_tile_encodes_to_constant_buffer() {
    let (db, _) = setup().await;
    let engine = engine(&db).await;
    // open ocean, far from both cells
    let tile = tile_at(8, 0.0, -30.0);
    let rows = engine.query(&TileRequest::new(tile)).await.unwrap();
    assert!(rows.rows.is_empty());
    let bytes = TileEncoder::new().encode(tile, &cells_to_features(rows.resolution, &rows.rows));
    assert_eq!(bytes, empty_tile());
}

#[tokio::test]
async fn coarse_zoom_sees_both_cells() {
    let (db, _) = setup().await;
    let engine = engine(&db).await;
    let rows = engine
        .query(&TileRequest::new(TileId::new(0, 0, 0).unwrap()))
        .await
        .unwrap();
    assert_eq!(rows.resolution, 4);
    assert_eq!(rows.rows.len(), 2);
}

#[tokio::test]
async fn unsupported_zoom_and_unknown_column() {
    let (db, _) = setup().await;
    let engine = engine(&db).await;
    let err = engine
        .query(&TileRequest::new(tile_at(14, POINT.0, POINT.1)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));

    let bogus = FilterSpec::from_json(&json!({"salinity": {"min": 1}})).unwrap();
    let err = engine
        .query(&TileRequest::new(tile_at(8, POINT.0, POINT.1)).with_filter(bogus))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidFilter(_)));
}

#[tokio::test]
async fn missing_index_is_distinct_from_empty_tile() {
    let (db, _) = setup().await;
    db.execute_batch("DROP TABLE geohashes; DROP TABLE geohash_builds;")
        .await
        .unwrap();
    let engine = engine(&db).await;
    let err = engine
        .query(&TileRequest::new(tile_at(8, POINT.0, POINT.1)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::IndexMissing { resolution: 7, .. }));
}

/// One fact row per point; attribute columns use reserved words.
async fn setup_points(points: &[(f64, f64)]) -> (SharedDatabase, Vec<CellIndex>) {
    let db = DuckDbDatabase::open_in_memory().unwrap();
    db.execute_batch(
        r#"CREATE TABLE cells (r4_id UBIGINT, r7_id UBIGINT, "order" DOUBLE, "end" BOOLEAN)"#,
    )
    .await
    .unwrap();
    let mut cells = Vec::new();
    for (i, (lat, lng)) in points.iter().enumerate() {
        let cell = LatLng::new(*lat, *lng).unwrap().to_cell(Resolution::Seven);
        let parent = cell.parent(Resolution::Four).unwrap();
        db.execute(
            "INSERT INTO cells VALUES ($1, $2, $3, $4)",
            &[
                u64::from(parent).into(),
                u64::from(cell).into(),
                (i as f64).into(),
                (i % 2 == 0).into(),
            ],
        )
        .await
        .unwrap();
        cells.push(cell);
    }
    let db: SharedDatabase = Arc::new(db);
    let report = GeohashIndexBuilder::new(db.clone(), stops())
        .rebuild(&mut NoopObserver)
        .await
        .unwrap();
    assert!(report.is_complete());
    (db, cells)
}

/// Zoom-`z` tiles whose quadkey is in the cover of `cell` at `z`.
fn covering_tiles(cell: CellIndex, z: u8) -> Vec<TileId> {
    let polygon = cell_polygon(cell);
    let cover: BTreeSet<String> = cover_tiles(&polygon, z).unwrap().into_iter().collect();
    let bbox = polygon.bounding_rect().unwrap();
    let n = 1i64 << z;
    let x0 = lng_to_tile_x(bbox.min().x, z).floor() as i64;
    let x1 = lng_to_tile_x(bbox.max().x, z).floor() as i64;
    let y0 = lat_to_tile_y(bbox.max().y, z).floor() as i64;
    let y1 = lat_to_tile_y(bbox.min().y, z).floor() as i64;

    let mut tiles = Vec::new();
    for x in x0..=x1 {
        for y in y0.max(0)..=y1.min(n - 1) {
            let tile = TileId::new(z, x.rem_euclid(n) as u32, y as u32).unwrap();
            if cover.contains(&tile.quadkey()) && !tiles.contains(&tile) {
                tiles.push(tile);
            }
        }
    }
    assert_eq!(tiles.len(), cover.len(), "every cover key maps to a tile");
    tiles
}

#[tokio::test]
async fn every_cover_tile_returns_its_cell() {
    // an interior point, the corner shared by tiles of every zoom at (0, 0),
    // a zoom-9 column boundary and the antimeridian
    let edge_lng = -180.0 + 360.0 * 137.0 / 512.0;
    let points = [(44.5, -68.2), (0.0, 0.0), (30.0, edge_lng), (10.0, 179.999)];
    let (db, cells) = setup_points(&points).await;
    let engine = engine(&db).await;
    let precision = 9;

    for cell in &cells {
        let tiles = covering_tiles(*cell, precision);
        assert!(!tiles.is_empty(), "{cell} has a cover");
        for tile in tiles {
            let rows = engine.query(&TileRequest::new(tile)).await.unwrap();
            assert!(
                rows.rows.iter().any(|r| r.cell == *cell),
                "{cell} missing from cover tile {tile}"
            );

            // ancestor inside the same stop matches by prefix
            let ancestor = TileId::new(6, tile.x >> 3, tile.y >> 3).unwrap();
            let rows = engine.query(&TileRequest::new(ancestor)).await.unwrap();
            assert!(
                rows.rows.iter().any(|r| r.cell == *cell),
                "{cell} missing from ancestor tile {ancestor}"
            );

            // deeper than the index precision matches by truncated key
            let descendant = TileId::new(11, tile.x * 4 + 1, tile.y * 4 + 2).unwrap();
            let rows = engine.query(&TileRequest::new(descendant)).await.unwrap();
            assert!(
                rows.rows.iter().any(|r| r.cell == *cell),
                "{cell} missing from descendant tile {descendant}"
            );
        }
    }
}

#[tokio::test]
async fn reserved_word_columns_can_be_filtered() {
    let (db, cells) = setup_points(&[(44.5, -68.2), (44.6, -68.3), (44.7, -68.4)]).await;
    let engine = engine(&db).await;
    let tile = tile_at(6, 44.6, -68.3);
    let filter = FilterSpec::from_json(&json!({"order": {"min": 1}, "end": {"bool": true}})).unwrap();
    let rows = engine
        .query(&TileRequest::new(tile).with_filter(filter))
        .await
        .unwrap();
    let matched: Vec<CellIndex> = rows.rows.iter().map(|r| r.cell).collect();
    assert_eq!(matched, vec![cells[2]], "only row 2 has order >= 1 and end = true");
}
