//! GeoJSON overlays of boxes and tiles for viewing on top of the slide.

use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;

use crate::{
    error::Result,
    types::{BoundingBox, PixelRect, TileRecord},
};

fn feature<P: Serialize>(id: usize, rect: &PixelRect, properties: &P) -> Result<Feature> {
    let properties = match serde_json::to_value(properties)? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    };

    Ok(Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&rect.to_geo_polygon()))),
        id: Some(geojson::feature::Id::Number(serde_json::Number::from(id))),
        properties,
        foreign_members: None,
    })
}

fn collection(features: Vec<Feature>, metadata: JsonObject) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(metadata),
    }
}

/// Component boxes in mask pixels
pub fn boxes_to_geojson(boxes: &[BoundingBox], mask_magnification: f64) -> Result<FeatureCollection> {
    let features = boxes
        .iter()
        .enumerate()
        .map(|(i, bbox)| feature(i, &bbox.rect(), bbox))
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = JsonObject::new();
    metadata.insert("magnification".to_string(), serde_json::json!(mask_magnification));
    metadata.insert("box_count".to_string(), serde_json::json!(boxes.len()));
    Ok(collection(features, metadata))
}

/// Tiles of one magnification, in record order
pub fn tiles_to_geojson(records: &[TileRecord], magnification: f64) -> Result<FeatureCollection> {
    let features = records
        .iter()
        .filter(|r| r.magnification == magnification)
        .enumerate()
        .map(|(i, record)| feature(i, &record.rect(), record))
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = JsonObject::new();
    metadata.insert("magnification".to_string(), serde_json::json!(magnification));
    metadata.insert("tile_count".to_string(), serde_json::json!(features.len()));
    Ok(collection(features, metadata))
}

/// Save GeoJSON to file
pub fn save_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(collection)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AcceptReason;

    fn record(magnification: f64, x: i64, size: u32) -> TileRecord {
        TileRecord {
            source: "slide".to_string(),
            magnification,
            x,
            y: 0,
            size,
            foreground_ratio: 0.5,
            reason: AcceptReason::Good,
            tile_index: 0,
            box_index: 0,
            label: 1,
        }
    }

    #[test]
    fn test_box_overlay_polygons() {
        let fc = boxes_to_geojson(&[BoundingBox::new(2, 3, 10, 5, 4)], 1.25).unwrap();
        assert_eq!(fc.features.len(), 1);
        let feature = &fc.features[0];
        let Some(Value::Polygon(rings)) = feature.geometry.as_ref().map(|g| &g.value) else {
            panic!("expected polygon");
        };
        let xs: Vec<f64> = rings[0].iter().map(|p| p[0]).collect();
        assert!(xs.contains(&2.0) && xs.contains(&12.0));
        assert_eq!(feature.property("label"), Some(&serde_json::json!(4)));
        assert_eq!(fc.foreign_members.unwrap()["box_count"], 1);
    }

    #[test]
    fn test_tile_overlay_keeps_one_magnification() {
        let records = vec![record(5.0, 0, 224), record(20.0, 0, 896), record(5.0, 224, 224)];
        let fc = tiles_to_geojson(&records, 5.0).unwrap();
        assert_eq!(fc.features.len(), 2);
        assert_eq!(fc.features[1].property("x"), Some(&serde_json::json!(224)));
        assert_eq!(fc.features[1].property("reason"), Some(&serde_json::json!("good")));
    }

    #[test]
    fn test_save_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.geojson");
        let fc = tiles_to_geojson(&[record(5.0, 0, 224)], 5.0).unwrap();
        save_geojson(&fc, &path).unwrap();
        let parsed: FeatureCollection = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(parsed.features.len(), 1);
    }
}
