use std::{fs::File, io::{BufReader, BufWriter, Write}, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Map, Value, json};

use crate::common::PendingWrite;

/// A GeoJSON feature with its raw geometry and properties.
#[derive(Debug, Clone)]
pub(crate) struct Feature {
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

/// Read every feature of a GeoJSON FeatureCollection file.
pub(crate) fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let file = File::open(path)
        .with_context(|| format!("[io::geojson] Failed to open GeoJSON file: {}", path.display()))?;
    let mut value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("[io::geojson] Failed to parse GeoJSON from {}", path.display()))?;

    let Some(features) = value.get_mut("features").and_then(Value::as_array_mut) else {
        bail!("[io::geojson] {} is not a FeatureCollection", path.display());
    };
    features.iter_mut()
        .map(|feature| {
            let geometry = feature.get_mut("geometry").map(Value::take).unwrap_or(Value::Null);
            let properties = match feature.get_mut("properties").map(Value::take) {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            Ok(Feature { geometry, properties })
        })
        .collect()
}

/// Write features as a GeoJSON FeatureCollection file.
pub(crate) fn write_features(path: &Path, features: Vec<Value>) -> Result<()> {
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    let mut sink = PendingWrite::open(path, true)
        .with_context(|| format!("[io::geojson] Failed to create GeoJSON file: {}", path.display()))?;
    let mut writer = BufWriter::new(&mut sink);
    serde_json::to_writer(&mut writer, &collection)
        .with_context(|| format!("[io::geojson] Failed to write GeoJSON to {}", path.display()))?;
    writer.flush()?;
    drop(writer);
    sink.finalize()
}

/// Build a feature from a geometry and properties.
pub(crate) fn feature(geometry: Value, properties: Map<String, Value>) -> Value {
    json!({ "type": "Feature", "geometry": geometry, "properties": properties })
}

// ---------------------------------------------------------------------------
// Geometry conversion
// ---------------------------------------------------------------------------

/// Parse a Polygon or MultiPolygon geometry.
pub(crate) fn parse_multipolygon(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let coords = geometry.get("coordinates").and_then(Value::as_array)
        .ok_or_else(|| anyhow!("[io::geojson] Geometry has no coordinates"))?;
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => Ok(MultiPolygon::new(vec![parse_polygon(coords)?])),
        Some("MultiPolygon") => coords.iter()
            .map(|p| p.as_array().ok_or_else(|| anyhow!("[io::geojson] Invalid polygon")).and_then(|p| parse_polygon(p)))
            .collect::<Result<Vec<_>>>()
            .map(MultiPolygon::new),
        other => bail!("[io::geojson] Expected a polygonal geometry, found {other:?}"),
    }
}

fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        ring.as_array()
            .ok_or_else(|| anyhow!("[io::geojson] Invalid ring"))
            .and_then(|r| parse_ring(r))
    });
    let exterior = rings.next().ok_or_else(|| anyhow!("[io::geojson] Polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(coords: &[Value]) -> Result<LineString<f64>> {
    let points = coords.iter().map(parse_position).collect::<Result<Vec<_>>>()?;
    // Polygon::new closes open rings
    Ok(LineString(points))
}

fn parse_position(value: &Value) -> Result<Coord<f64>> {
    let pair = value.as_array().filter(|a| a.len() >= 2)
        .ok_or_else(|| anyhow!("[io::geojson] Invalid position {value}"))?;
    let x = pair[0].as_f64().ok_or_else(|| anyhow!("[io::geojson] Invalid coordinate: x must be a number"))?;
    let y = pair[1].as_f64().ok_or_else(|| anyhow!("[io::geojson] Invalid coordinate: y must be a number"))?;
    Ok(Coord { x, y })
}

fn ring_coords(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

pub(crate) fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<Vec<Vec<[f64; 2]>>> = mp.0.iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(ring_coords)
                .collect()
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}

pub(crate) fn linestring_to_geojson(line: &LineString<f64>) -> Value {
    json!({ "type": "LineString", "coordinates": ring_coords(line) })
}

pub(crate) fn point_to_geojson(x: f64, y: f64) -> Value {
    json!({ "type": "Point", "coordinates": [x, y] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn polygon_and_multipolygon_parse_alike() {
        let square = json!([[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]],
                            [[0.5, 0.5], [1.0, 0.5], [1.0, 1.0], [0.5, 0.5]]]);
        let poly = parse_multipolygon(&json!({ "type": "Polygon", "coordinates": square })).unwrap();
        let multi = parse_multipolygon(&json!({ "type": "MultiPolygon", "coordinates": [square] })).unwrap();
        assert_eq!(poly, multi);
        assert!((poly.unsigned_area() - 3.875).abs() < 1e-12);

        let back = parse_multipolygon(&multipolygon_to_geojson(&poly)).unwrap();
        assert_eq!(back, poly);
    }

    #[test]
    fn non_polygons_are_rejected() {
        let point = point_to_geojson(1.0, 2.0);
        assert!(parse_multipolygon(&point).is_err());
    }

    #[test]
    fn feature_collection_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/fc.geojson");
        let mut props = Map::new();
        props.insert("name".into(), json!("a"));
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        write_features(&path, vec![feature(linestring_to_geojson(&line), props)]).unwrap();

        let features = read_features(&path).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].properties["name"], "a");
        assert_eq!(features[0].geometry["type"], "LineString");
    }
}
