//! PACE OCI Level-2 granule reader (NetCDF4).
//!
//! An OCI L2 file spreads one logical dataset over several groups. Opening it
//! flattens them into an [`OciGranule`]: root attributes, every variable of
//! `geophysical_data` (decoded with `scale_factor`/`add_offset`, fill values as
//! NaN), the coordinate variables of `sensor_band_parameters` when the group
//! exists, and the `latitude`/`longitude` grids of `navigation_data`.
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayD, IxDyn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::granule::Timestamped;
use crate::io::emit::{BAND_GROUP, GranuleAttribute};

pub const GEOPHYSICAL_GROUP: &str = "geophysical_data";
pub const NAVIGATION_GROUP: &str = "navigation_data";

/// A decoded geophysical variable
#[derive(Debug, Clone)]
pub struct OciVariable {
    pub dimensions: Vec<String>,
    pub data: ArrayD<f32>,
    pub units: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OciGranule {
    pub path: PathBuf,
    pub attributes: BTreeMap<String, GranuleAttribute>,
    pub variables: BTreeMap<String, OciVariable>,
    /// Band coordinates by dimension name, e.g. `wavelength_3d`
    pub coordinates: BTreeMap<String, Vec<f64>>,
    pub latitude: Array2<f32>,
    pub longitude: Array2<f32>,
}

fn attributes_of<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> BTreeMap<String, GranuleAttribute> {
    attrs
        .filter_map(|attr| {
            let name = attr.name().to_string();
            attr.value().ok().map(|v| (name, GranuleAttribute::from(v)))
        })
        .collect()
}

fn number(attrs: &BTreeMap<String, GranuleAttribute>, key: &str) -> Option<f64> {
    match attrs.get(key)? {
        GranuleAttribute::Number(v) => Some(*v),
        GranuleAttribute::Numbers(v) => v.first().copied(),
        GranuleAttribute::Text(_) => None,
    }
}

/// Raw values with fill masked to NaN, then `raw * scale + offset`
fn decode(raw: Vec<f64>, attrs: &BTreeMap<String, GranuleAttribute>) -> Vec<f32> {
    let fill = number(attrs, "_FillValue");
    let scale = number(attrs, "scale_factor").unwrap_or(1.0);
    let offset = number(attrs, "add_offset").unwrap_or(0.0);
    raw.into_iter()
        .map(|v| {
            if v.is_nan() || fill.is_some_and(|f| v == f) {
                f32::NAN
            } else {
                (v * scale + offset) as f32
            }
        })
        .collect()
}

fn read_variable(var: &netcdf::Variable) -> Result<OciVariable> {
    let dims = var.dimensions();
    let shape: Vec<usize> = dims.iter().map(|d| d.len()).collect();
    let attrs = attributes_of(var.attributes());
    let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
    let data = ArrayD::from_shape_vec(IxDyn(&shape), decode(raw, &attrs)).map_err(Error::external)?;
    Ok(OciVariable {
        dimensions: dims.iter().map(|d| d.name()).collect(),
        data,
        units: match attrs.get("units") {
            Some(GranuleAttribute::Text(u)) => Some(u.clone()),
            _ => None,
        },
    })
}

fn group<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Group<'f>> {
    file.group(name)?
        .ok_or_else(|| Error::MissingVariable(name.to_string()))
}

fn read_grid(nav: &netcdf::Group, name: &str) -> Result<Array2<f32>> {
    let var = nav
        .variable(name)
        .ok_or_else(|| Error::MissingVariable(format!("{}/{}", NAVIGATION_GROUP, name)))?;
    let decoded = read_variable(&var)?;
    decoded
        .data
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|_| Error::shape("navigation grid dimensions", 2, decoded.dimensions.len()))
}

impl OciGranule {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening PACE OCI granule {:?}", path);
        let file = netcdf::open(&path)?;
        let attributes = attributes_of(file.attributes());

        let geophysical = group(&file, GEOPHYSICAL_GROUP)?;
        let variables = geophysical
            .variables()
            .map(|var| Ok((var.name(), read_variable(&var)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        // Older products have no band group; their variables are 2-D only
        let mut coordinates = BTreeMap::new();
        if let Some(bands) = file.group(BAND_GROUP)? {
            for var in bands.variables() {
                let name = var.name();
                let dims = var.dimensions();
                if dims.len() == 1 && dims[0].name() == name {
                    coordinates.insert(name, var.get_values::<f64, _>(..)?);
                }
            }
        }

        let nav = group(&file, NAVIGATION_GROUP)?;
        let latitude = read_grid(&nav, "latitude")?;
        let longitude = read_grid(&nav, "longitude")?;
        if latitude.dim() != longitude.dim() {
            return Err(Error::shape("longitude grid", latitude.len(), longitude.len()));
        }
        for (name, var) in &variables {
            let lines_pixels = &var.data.shape()[..var.data.ndim().min(2)];
            if lines_pixels != [latitude.nrows(), latitude.ncols()] {
                return Err(Error::ShapeMismatch {
                    context: "geophysical variable grid",
                    expected: latitude.len(),
                    actual: lines_pixels.iter().product(),
                });
            }
            debug!("{}: {:?}", name, var.dimensions);
        }

        Ok(Self {
            path,
            attributes,
            variables,
            coordinates,
            latitude,
            longitude,
        })
    }

    pub fn variable(&self, name: &str) -> Option<&OciVariable> {
        self.variables.get(name)
    }

    /// Band coordinate of a 3-D variable's last axis, e.g. `wavelength_3d` for `Rrs`
    pub fn band_axis(&self, name: &str) -> Option<&[f64]> {
        let var = self.variables.get(name)?;
        if var.data.ndim() < 3 {
            return None;
        }
        let dim = var.dimensions.last()?;
        self.coordinates.get(dim).map(Vec::as_slice)
    }

    /// Latitude/longitude bounding box `(west, south, east, north)` of valid pixels
    pub fn bounds(&self) -> Option<[f64; 4]> {
        let mut bbox: Option<[f64; 4]> = None;
        for (&lat, &lon) in self.latitude.iter().zip(self.longitude.iter()) {
            if lat.is_nan() || lon.is_nan() {
                continue;
            }
            let (lon, lat) = (lon as f64, lat as f64);
            bbox = Some(match bbox {
                None => [lon, lat, lon, lat],
                Some([w, s, e, n]) => [w.min(lon), s.min(lat), e.max(lon), n.max(lat)],
            });
        }
        bbox
    }
}

impl Timestamped for OciGranule {
    /// `time_coverage_start` root attribute
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.attributes.get("time_coverage_start")? {
            GranuleAttribute::Text(t) => DateTime::parse_from_rfc3339(t)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, f64)]) -> BTreeMap<String, GranuleAttribute> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), GranuleAttribute::Number(*v)))
            .collect()
    }

    #[test]
    fn test_decode_scales_and_masks_fill() {
        let a = attrs(&[("_FillValue", -32767.0), ("scale_factor", 2e-6), ("add_offset", 0.05)]);
        let out = decode(vec![0.0, -32767.0, 1000.0], &a);
        assert_eq!(out[0], 0.05);
        assert!(out[1].is_nan());
        assert!((out[2] - 0.052).abs() < 1e-7);
    }

    #[test]
    fn test_decode_without_packing_is_identity() {
        let out = decode(vec![1.5, f64::NAN], &BTreeMap::new());
        assert_eq!(out[0], 1.5);
        assert!(out[1].is_nan());
    }
}
