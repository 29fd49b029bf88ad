//! Minimal planar polygon type plus the coordinate helpers the granule and AOI
//! tools need. Coordinates are `(x, y)`, i.e. `(lon, lat)` in EPSG:4326.
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Single exterior ring. The ring is stored closed (first == last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<(f64, f64)>,
}

impl Polygon {
    /// Build a polygon, closing the ring if needed
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 3 {
            return Err(Error::InvalidArgument {
                arg: "polygon",
                value: format!("{} vertices", points.len()),
            });
        }
        if points.first() != points.last() {
            points.push(points[0]);
        }
        Ok(Self { exterior: points })
    }

    /// Axis-aligned box with a counter-clockwise ring starting at the south-east corner
    pub fn from_bounds(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            exterior: vec![
                (east, south),
                (east, north),
                (west, north),
                (west, south),
                (east, south),
            ],
        }
    }

    /// (min x, min y, max x, max y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.exterior.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(minx, miny, maxx, maxy), &(x, y)| (minx.min(x), miny.min(y), maxx.max(x), maxy.max(y)),
        )
    }

    /// Shoelace area, positive for counter-clockwise rings
    pub fn signed_area(&self) -> f64 {
        self.exterior
            .windows(2)
            .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
            .sum::<f64>()
            / 2.0
    }

    /// Even-odd point in polygon test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for w in self.exterior.windows(2) {
            let ((xi, yi), (xj, yj)) = (w[0], w[1]);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
        }
        inside
    }

    /// GeoJSON geometry object
    pub fn to_geojson(&self) -> Value {
        let ring: Vec<[f64; 2]> = self.exterior.iter().map(|&(x, y)| [x, y]).collect();
        json!({ "type": "Polygon", "coordinates": [ring] })
    }
}

/// Leaflet bounds notation: `(lon1, lat1, lon2, lat2) -> ((lat1, lon1), (lat2, lon2))`
pub fn convert_bounds(bbox: [f64; 4], invert_y: bool) -> ((f64, f64), (f64, f64)) {
    let [x1, mut y1, x2, mut y2] = bbox;
    if invert_y {
        std::mem::swap(&mut y1, &mut y2);
    }
    ((y1, x1), (y2, x2))
}

/// Reproject polygon vertices between EPSG codes, output in (x, y) / (lon, lat) order
pub fn reproject(polygon: &Polygon, from_epsg: u32, to_epsg: u32) -> Result<Polygon> {
    let source_srs = SpatialRef::from_epsg(from_epsg)?;
    let target_srs = SpatialRef::from_epsg(to_epsg)?;
    transform_polygon(polygon, source_srs, target_srs)
}

/// Reproject into a CRS given as `EPSG:<code>`, WKT or PROJ string
pub fn reproject_to(polygon: &Polygon, from_epsg: u32, definition: &str) -> Result<Polygon> {
    let source_srs = SpatialRef::from_epsg(from_epsg)?;
    let target_srs = SpatialRef::from_definition(definition)?;
    transform_polygon(polygon, source_srs, target_srs)
}

fn transform_polygon(polygon: &Polygon, mut source_srs: SpatialRef, mut target_srs: SpatialRef) -> Result<Polygon> {
    source_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    target_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let transform = CoordTransform::new(&source_srs, &target_srs)?;

    let mut xs: Vec<f64> = polygon.exterior.iter().map(|p| p.0).collect();
    let mut ys: Vec<f64> = polygon.exterior.iter().map(|p| p.1).collect();
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    Ok(Polygon {
        exterior: xs.into_iter().zip(ys).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_box_is_closed_and_ccw() {
        let b = Polygon::from_bounds(-120.0, 34.0, -119.0, 35.0);
        assert_eq!(b.exterior.len(), 5);
        assert_eq!(b.exterior.first(), b.exterior.last());
        assert!(b.signed_area() > 0.0);
        assert_eq!(b.bounds(), (-120.0, 34.0, -119.0, 35.0));
    }

    #[test]
    fn test_new_closes_ring() {
        let p = Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]).unwrap();
        assert_eq!(p.exterior.len(), 4);
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 0.0)]).is_err());
    }

    #[test]
    fn test_contains() {
        let p = Polygon::new(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (2.0, 1.0), (0.0, 4.0)]).unwrap();
        assert!(p.contains(1.0, 0.5));
        assert!(!p.contains(2.0, 3.0));
        assert!(!p.contains(5.0, 1.0));
    }

    #[test]
    fn test_convert_bounds() {
        assert_eq!(
            convert_bounds([-120.0, 34.0, -119.0, 35.0], false),
            ((34.0, -120.0), (35.0, -119.0))
        );
        assert_eq!(
            convert_bounds([-120.0, 34.0, -119.0, 35.0], true),
            ((35.0, -120.0), (34.0, -119.0))
        );
    }

    #[test]
    fn test_reproject_web_mercator_to_wgs84() {
        let p = Polygon::new(vec![
            (0.0, 0.0),
            (111_319.490_793_273_6, 0.0),
            (111_319.490_793_273_6, 111_325.142_866_385_1),
        ])
        .unwrap();
        let out = reproject(&p, 3857, 4326).unwrap();
        assert_abs_diff_eq!(out.exterior[1].0, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.exterior[2].1, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_reproject_to_definition_matches_epsg() {
        let p = Polygon::from_bounds(-117.01, 34.3, -116.99, 34.31);
        let by_code = reproject(&p, 4326, 32611).unwrap();
        let by_definition = reproject_to(&p, 4326, "EPSG:32611").unwrap();
        for (a, b) in by_code.exterior.iter().zip(&by_definition.exterior) {
            assert_abs_diff_eq!(a.0, b.0, epsilon = 1e-6);
            assert_abs_diff_eq!(a.1, b.1, epsilon = 1e-6);
        }
        // near the zone 11 central meridian
        assert_abs_diff_eq!(by_code.bounds().0, 499_080.0, epsilon = 20.0);
    }
}
