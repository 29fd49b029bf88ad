//! Raster value extraction under polygons, with optional per-polygon statistics.
//!
//! AOIs are EPSG:4326; they are brought into the raster's CRS before any pixel
//! center is tested. Feature properties become extra columns on every output row.
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::aoi::{Aoi, WGS84};
use crate::error::Result;
use crate::geometry::reproject_to;
use crate::io::gdal::GeoRaster;

/// One pixel whose center falls inside a polygon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelRecord {
    pub poly_fid: usize,
    /// Polygon properties, aligned with the extraction's `columns`
    pub attributes: Vec<String>,
    pub y: f64,
    pub x: f64,
    /// `"<y>_<x>"` of the pixel center
    pub cell_number: String,
    /// One value per band, NaN for no-data
    pub values: Vec<f64>,
}

/// Mean and median of every band over one polygon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolygonSummary {
    pub poly_fid: usize,
    pub attributes: Vec<String>,
    pub means: Vec<f64>,
    pub medians: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Pixels {
        columns: Vec<String>,
        bands: Vec<String>,
        rows: Vec<PixelRecord>,
    },
    Summary {
        columns: Vec<String>,
        bands: Vec<String>,
        rows: Vec<PolygonSummary>,
    },
}

/// Property keys over all polygons, in order of first appearance
pub fn attribute_columns(polygons: &[Aoi]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in polygons.iter().flat_map(|aoi| aoi.properties.keys()) {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.clone());
        }
    }
    columns
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn attribute_values(aoi: &Aoi, columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| cell_text(aoi.properties.get(c))).collect()
}

/// True when `projection` names geographic WGS84 or is unknown
fn is_wgs84(projection: &str) -> bool {
    let p = projection.trim();
    p.is_empty() || p.eq_ignore_ascii_case(&format!("EPSG:{}", WGS84))
}

/// AOIs reprojected into the raster CRS, untouched when it is already EPSG:4326
pub fn aois_in_raster_crs<'a>(raster: &GeoRaster, polygons: &'a [Aoi]) -> Result<Cow<'a, [Aoi]>> {
    if is_wgs84(&raster.projection) {
        if raster.projection.trim().is_empty() {
            warn!("Raster has no CRS; assuming AOI coordinates match it");
        }
        return Ok(Cow::Borrowed(polygons));
    }
    debug!("Reprojecting {} AOI(s) into {}", polygons.len(), raster.projection);
    polygons
        .iter()
        .map(|aoi| {
            Ok(Aoi {
                geometry: reproject_to(&aoi.geometry, WGS84, &raster.projection)?,
                ..aoi.clone()
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Cow::Owned)
}

/// Pixels of `raster` whose centers lie inside each polygon, polygons in order.
///
/// Polygons must already be in the raster's CRS.
pub fn extract_pixels(raster: &GeoRaster, polygons: &[Aoi], columns: &[String]) -> Vec<PixelRecord> {
    let (nrows, ncols) = raster.dim();
    let mut records = Vec::new();
    for aoi in polygons {
        let (minx, miny, maxx, maxy) = aoi.geometry.bounds();
        let attributes = attribute_values(aoi, columns);
        let before = records.len();
        for row in 0..nrows {
            for col in 0..ncols {
                let (x, y) = raster.pixel_center(row, col);
                if x < minx || x > maxx || y < miny || y > maxy || !aoi.geometry.contains(x, y) {
                    continue;
                }
                records.push(PixelRecord {
                    poly_fid: aoi.poly_fid,
                    attributes: attributes.clone(),
                    y,
                    x,
                    cell_number: format!("{}_{}", y, x),
                    values: raster.bands.iter().map(|b| b.data[[row, col]]).collect(),
                });
            }
        }
        debug!("Polygon {} covers {} pixels", aoi.poly_fid, records.len() - before);
    }
    records
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Per-polygon mean and median over non-NaN values
pub fn summarize(
    records: &[PixelRecord],
    polygons: &[Aoi],
    columns: &[String],
    band_count: usize,
) -> Vec<PolygonSummary> {
    polygons
        .iter()
        .map(|aoi| {
            let mut means = Vec::with_capacity(band_count);
            let mut medians = Vec::with_capacity(band_count);
            for band in 0..band_count {
                let mut values: Vec<f64> = records
                    .iter()
                    .filter(|r| r.poly_fid == aoi.poly_fid)
                    .map(|r| r.values[band])
                    .filter(|v| !v.is_nan())
                    .collect();
                means.push(mean(&values));
                medians.push(median(&mut values));
            }
            PolygonSummary {
                poly_fid: aoi.poly_fid,
                attributes: attribute_values(aoi, columns),
                means,
                medians,
            }
        })
        .collect()
}

/// Values (or per-polygon statistics) of every band under each EPSG:4326 AOI
pub fn extract_raster_values(raster: &GeoRaster, polygons: &[Aoi], summary: bool) -> Result<Extraction> {
    let bands: Vec<String> = raster.bands.iter().map(|b| b.name.clone()).collect();
    let columns = attribute_columns(polygons);
    let polygons = aois_in_raster_crs(raster, polygons)?;
    let rows = extract_pixels(raster, &polygons, &columns);
    Ok(if summary {
        let rows = summarize(&rows, &polygons, &columns, bands.len());
        Extraction::Summary { columns, bands, rows }
    } else {
        Extraction::Pixels { columns, bands, rows }
    })
}

impl Extraction {
    pub fn len(&self) -> usize {
        match self {
            Extraction::Pixels { rows, .. } => rows.len(),
            Extraction::Summary { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        match self {
            Extraction::Pixels { columns, bands, rows } => {
                let mut header = vec!["poly_fid".to_string()];
                header.extend(columns.iter().cloned());
                header.extend(["y".to_string(), "x".into(), "cell_number".into()]);
                header.extend(bands.iter().cloned());
                wtr.write_record(&header)?;
                for r in rows {
                    let mut record = vec![r.poly_fid.to_string()];
                    record.extend(r.attributes.iter().cloned());
                    record.extend([r.y.to_string(), r.x.to_string(), r.cell_number.clone()]);
                    record.extend(r.values.iter().map(|v| v.to_string()));
                    wtr.write_record(&record)?;
                }
            }
            Extraction::Summary { columns, bands, rows } => {
                let mut header = vec!["poly_fid".to_string()];
                header.extend(columns.iter().cloned());
                for band in bands {
                    header.push(format!("{}_mean", band));
                    header.push(format!("{}_median", band));
                }
                wtr.write_record(&header)?;
                for r in rows {
                    let mut record = vec![r.poly_fid.to_string()];
                    record.extend(r.attributes.iter().cloned());
                    for (m, md) in r.means.iter().zip(&r.medians) {
                        record.push(m.to_string());
                        record.push(md.to_string());
                    }
                    wtr.write_record(&record)?;
                }
            }
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, reproject};
    use crate::io::gdal::NamedBand;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use serde_json::json;

    fn raster() -> GeoRaster {
        // 3x3 grid of unit pixels, origin at (0, 3), north up
        GeoRaster::new(
            vec![
                NamedBand {
                    name: "cwc".into(),
                    data: array![[0.1, 0.2, 0.3], [0.4, f64::NAN, 0.6], [0.7, 0.8, 0.9]],
                },
                NamedBand {
                    name: "lst".into(),
                    data: array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
                },
            ],
            [0.0, 1.0, 0.0, 3.0, 0.0, -1.0],
            "EPSG:4326",
        )
        .unwrap()
    }

    fn aois() -> Vec<Aoi> {
        vec![
            // top-left 2x2 block of pixel centers
            Aoi::new(0, Polygon::from_bounds(0.0, 1.0, 2.0, 3.0)),
            // only the bottom-right center
            Aoi::new(1, Polygon::from_bounds(2.2, 0.2, 2.8, 0.8)),
        ]
    }

    #[test]
    fn test_pixel_centers_inside_polygons() {
        let records = extract_pixels(&raster(), &aois(), &[]);
        let first: Vec<&PixelRecord> = records.iter().filter(|r| r.poly_fid == 0).collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].cell_number, "2.5_0.5");
        assert_eq!(first[0].values, vec![0.1, 1.0]);

        let second: Vec<&PixelRecord> = records.iter().filter(|r| r.poly_fid == 1).collect();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].values, vec![0.9, 9.0]);
    }

    #[test]
    fn test_summary_skips_nan() {
        let extraction = extract_raster_values(&raster(), &aois(), true).unwrap();
        let Extraction::Summary { bands, rows, .. } = extraction else {
            panic!("expected summary");
        };
        assert_eq!(bands, vec!["cwc", "lst"]);
        // cwc over {0.1, 0.2, 0.4, NaN}
        assert_abs_diff_eq!(rows[0].means[0], 0.7 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].medians[0], 0.2, epsilon = 1e-12);
        // lst over {1, 2, 4, 5}
        assert_abs_diff_eq!(rows[0].means[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].medians[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[1].means[0], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_csv_headers() {
        let mut out = Vec::new();
        extract_raster_values(&raster(), &aois(), true)
            .unwrap()
            .write_csv(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("poly_fid,cwc_mean,cwc_median,lst_mean,lst_median\n"));
        assert_eq!(text.lines().count(), 3);

        let mut out = Vec::new();
        extract_raster_values(&raster(), &aois(), false)
            .unwrap()
            .write_csv(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("poly_fid,y,x,cell_number,cwc,lst\n"));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn test_polygon_properties_become_columns() {
        let mut polygons = aois();
        polygons[0].properties.insert("site".into(), json!("north"));
        polygons[1].properties.insert("site".into(), json!("south"));
        polygons[1].properties.insert("plot".into(), json!(4));

        let mut out = Vec::new();
        extract_raster_values(&raster(), &polygons, false)
            .unwrap()
            .write_csv(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "poly_fid,site,plot,y,x,cell_number,cwc,lst");
        assert_eq!(lines[1], "0,north,,2.5,0.5,2.5_0.5,0.1,1");
        assert_eq!(lines[5], "1,south,4,0.5,2.5,0.5_2.5,0.9,9");

        let mut out = Vec::new();
        extract_raster_values(&raster(), &polygons, true)
            .unwrap()
            .write_csv(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("poly_fid,site,plot,cwc_mean,cwc_median,lst_mean,lst_median\n"));
        assert!(text.lines().nth(2).unwrap().starts_with("1,south,4,0.9,0.9,9,9"));
    }

    #[test]
    fn test_aois_follow_projected_raster() {
        // 3x3 grid of 70 m UTM 11N pixels at the zone's central meridian
        let utm = GeoRaster::new(
            vec![NamedBand {
                name: "cwc".into(),
                data: array![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6], [0.7, 0.8, 0.9]],
            }],
            [500_000.0, 70.0, 0.0, 3_800_000.0, 0.0, -70.0],
            "EPSG:32611",
        )
        .unwrap();
        // 40 m box around the center pixel's center, expressed in lon/lat
        let (cx, cy) = utm.pixel_center(1, 1);
        let local = Polygon::from_bounds(cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0);
        let lonlat = reproject(&local, 32611, WGS84).unwrap();
        assert!(lonlat.bounds().0 < -116.0 && lonlat.bounds().0 > -118.0);

        let extraction = extract_raster_values(&utm, &[Aoi::new(0, lonlat)], false).unwrap();
        let Extraction::Pixels { rows, .. } = extraction else {
            panic!("expected pixels");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values, vec![0.5]);
        assert_eq!(rows[0].cell_number, format!("{}_{}", cy, cx));
    }
}
