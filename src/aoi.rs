//! Areas of interest drawn on an interactive map.
//!
//! Drawing tools report each polygon as two vertex lists (`xs`, `ys`) in the map's
//! projection (web mercator by default) and without a closing vertex.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::{Polygon, reproject};

pub const WEB_MERCATOR: u32 = 3857;
pub const WGS84: u32 = 4326;

/// One polygon as reported by a drawing tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnPolygon {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

/// An AOI with its draw-order identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aoi {
    pub poly_fid: usize,
    pub geometry: Polygon,
    /// Feature properties other than `poly_fid`, carried onto extraction rows
    pub properties: Map<String, Value>,
}

impl Aoi {
    pub fn new(poly_fid: usize, geometry: Polygon) -> Self {
        Self {
            poly_fid,
            geometry,
            properties: Map::new(),
        }
    }
}

/// Close the drawn ring by repeating its first vertex
pub fn drawn_to_geometry(drawn: &DrawnPolygon) -> Result<Polygon> {
    if drawn.xs.len() != drawn.ys.len() {
        return Err(Error::shape("drawn polygon", drawn.xs.len(), drawn.ys.len()));
    }
    let mut ring: Vec<(f64, f64)> = drawn.xs.iter().copied().zip(drawn.ys.iter().copied()).collect();
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    Polygon::new(ring)
}

/// Number polygons in draw order and bring them to EPSG:4326
pub fn create_aoi_collection(polygons: &[DrawnPolygon], transform_needed: bool) -> Result<Vec<Aoi>> {
    polygons
        .iter()
        .enumerate()
        .map(|(poly_fid, drawn)| {
            let polygon = drawn_to_geometry(drawn)?;
            let geometry = if transform_needed {
                reproject(&polygon, WEB_MERCATOR, WGS84)?
            } else {
                polygon
            };
            debug!("AOI {} with {} vertices", poly_fid, geometry.exterior.len());
            Ok(Aoi::new(poly_fid, geometry))
        })
        .collect()
}

/// GeoJSON FeatureCollection with a `poly_fid` property per feature
pub fn aois_to_geojson(aois: &[Aoi]) -> Value {
    let features: Vec<Value> = aois
        .iter()
        .map(|aoi| {
            let mut properties = aoi.properties.clone();
            properties.insert("poly_fid".to_string(), json!(aoi.poly_fid));
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": aoi.geometry.to_geojson(),
            })
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "EPSG:4326" } },
        "features": features,
    })
}

/// Read AOIs back from a GeoJSON FeatureCollection of polygons
pub fn aois_from_geojson(value: &Value) -> Result<Vec<Aoi>> {
    let features = value["features"].as_array().ok_or_else(|| Error::InvalidArgument {
        arg: "geojson",
        value: "missing features array".to_string(),
    })?;
    features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let ring = feature["geometry"]["coordinates"][0]
                .as_array()
                .ok_or_else(|| Error::UnsupportedGeometry(format!("feature {}", i)))?;
            let points = ring
                .iter()
                .map(|p| match (p[0].as_f64(), p[1].as_f64()) {
                    (Some(x), Some(y)) => Ok((x, y)),
                    _ => Err(Error::UnsupportedGeometry(format!("feature {}", i))),
                })
                .collect::<Result<Vec<_>>>()?;
            let mut properties = feature["properties"].as_object().cloned().unwrap_or_default();
            let poly_fid = properties
                .remove("poly_fid")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(i);
            Ok(Aoi {
                poly_fid,
                geometry: Polygon::new(points)?,
                properties,
            })
        })
        .collect()
}

pub fn read_drawn_polygons<P: AsRef<Path>>(path: P) -> Result<Vec<DrawnPolygon>> {
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_aois<P: AsRef<Path>>(path: P) -> Result<Vec<Aoi>> {
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let value: Value = serde_json::from_reader(reader)?;
    aois_from_geojson(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(offset: f64) -> DrawnPolygon {
        DrawnPolygon {
            xs: vec![offset, offset + 1.0, offset + 1.0, offset],
            ys: vec![0.0, 0.0, 1.0, 1.0],
        }
    }

    #[test]
    fn test_drawn_ring_is_closed() {
        let p = drawn_to_geometry(&square(0.0)).unwrap();
        assert_eq!(p.exterior.len(), 5);
        assert_eq!(p.exterior[4], (0.0, 0.0));
    }

    #[test]
    fn test_poly_fid_follows_draw_order() {
        let aois = create_aoi_collection(&[square(5.0), square(0.0), square(2.0)], false).unwrap();
        let fids: Vec<usize> = aois.iter().map(|a| a.poly_fid).collect();
        assert_eq!(fids, vec![0, 1, 2]);
        assert_eq!(aois[1].geometry.exterior[0], (0.0, 0.0));

        let back = aois_from_geojson(&aois_to_geojson(&aois)).unwrap();
        assert_eq!(back, aois);
    }

    #[test]
    fn test_transform_from_web_mercator() {
        let drawn = DrawnPolygon {
            xs: vec![0.0, 111_319.490_793_273_6, 0.0],
            ys: vec![0.0, 0.0, 111_325.142_866_385_1],
        };
        let aois = create_aoi_collection(&[drawn], true).unwrap();
        let ring = &aois[0].geometry.exterior;
        assert_abs_diff_eq!(ring[1].0, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ring[2].1, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_geojson_properties_survive() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "poly_fid": 7, "site": "Jack and Laura Dangermond Preserve", "plot": 3 },
                "geometry": { "type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]] }
            }]
        });
        let aois = aois_from_geojson(&value).unwrap();
        assert_eq!(aois[0].poly_fid, 7);
        assert_eq!(aois[0].properties.len(), 2);
        assert_eq!(aois[0].properties["plot"], json!(3));

        let back = aois_from_geojson(&aois_to_geojson(&aois)).unwrap();
        assert_eq!(back, aois);
    }

    #[test]
    fn test_mismatched_vertex_lists() {
        let bad = DrawnPolygon {
            xs: vec![0.0, 1.0],
            ys: vec![0.0],
        };
        assert!(drawn_to_geometry(&bad).is_err());
    }
}
