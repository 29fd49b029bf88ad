//! EMIT L2A reflectance granule reader (NetCDF4 / HDF5).
//!
//! Two layouts are accepted:
//!
//! * the distributed sensor-space product: root `reflectance(downtrack, crosstrack, bands)`,
//!   band parameters in the `sensor_band_parameters` group and the geometry lookup table
//!   in the `location` group;
//! * an orthorectified product: a root `wavelengths` axis and a root `spatial_ref`
//!   variable, with `reflectance(latitude, longitude, wavelengths)`.
//!
//! Either way the wavelength axis is normalized into [`EmitGranule::wavelengths`].
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::ortho::Glt;
use crate::error::{Error, Result};
use crate::io::source::CubeSource;
use crate::types::{GeometryMode, RowRange};

pub const REFLECTANCE: &str = "reflectance";
pub const BAND_GROUP: &str = "sensor_band_parameters";
pub const LOCATION_GROUP: &str = "location";

/// A root attribute of the granule, reduced to the shapes EMIT uses
#[derive(Debug, Clone, PartialEq)]
pub enum GranuleAttribute {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl std::fmt::Display for GranuleAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GranuleAttribute::Text(s) => write!(f, "{}", s),
            GranuleAttribute::Number(v) => write!(f, "{}", v),
            GranuleAttribute::Numbers(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

impl From<netcdf::AttributeValue> for GranuleAttribute {
    fn from(value: netcdf::AttributeValue) -> Self {
        use netcdf::AttributeValue as V;
        let many = |v: Vec<f64>| GranuleAttribute::Numbers(v);
        match value {
            V::Str(s) => GranuleAttribute::Text(s),
            V::Strs(s) => GranuleAttribute::Text(s.join(", ")),
            V::Double(v) => GranuleAttribute::Number(v),
            V::Float(v) => GranuleAttribute::Number(v as f64),
            V::Int(v) => GranuleAttribute::Number(v as f64),
            V::Uint(v) => GranuleAttribute::Number(v as f64),
            V::Short(v) => GranuleAttribute::Number(v as f64),
            V::Ushort(v) => GranuleAttribute::Number(v as f64),
            V::Schar(v) => GranuleAttribute::Number(v as f64),
            V::Uchar(v) => GranuleAttribute::Number(v as f64),
            V::Longlong(v) => GranuleAttribute::Number(v as f64),
            V::Ulonglong(v) => GranuleAttribute::Number(v as f64),
            V::Doubles(v) => many(v),
            V::Floats(v) => many(v.into_iter().map(f64::from).collect()),
            V::Ints(v) => many(v.into_iter().map(f64::from).collect()),
            V::Uints(v) => many(v.into_iter().map(f64::from).collect()),
            V::Shorts(v) => many(v.into_iter().map(f64::from).collect()),
            V::Ushorts(v) => many(v.into_iter().map(f64::from).collect()),
            V::Schars(v) => many(v.into_iter().map(f64::from).collect()),
            V::Uchars(v) => many(v.into_iter().map(f64::from).collect()),
            V::Longlongs(v) => many(v.into_iter().map(|x| x as f64).collect()),
            V::Ulonglongs(v) => many(v.into_iter().map(|x| x as f64).collect()),
            #[allow(unreachable_patterns)]
            other => GranuleAttribute::Text(format!("{:?}", other)),
        }
    }
}

/// Everything the water content job needs to know about a granule before reading pixels
#[derive(Debug, Clone)]
pub struct EmitGranule {
    pub path: PathBuf,
    /// (rows, columns, bands) of the reflectance cube
    pub shape: (usize, usize, usize),
    /// Band centers (nm)
    pub wavelengths: Vec<f64>,
    pub attributes: BTreeMap<String, GranuleAttribute>,
    pub mode: GeometryMode,
}

impl EmitGranule {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening EMIT granule {:?}", path);
        let file = netcdf::open(&path)?;

        let shape = reflectance_shape(&file)?;
        let attributes: BTreeMap<String, GranuleAttribute> = file
            .attributes()
            .filter_map(|attr| {
                let name = attr.name().to_string();
                attr.value().ok().map(|v| (name, GranuleAttribute::from(v)))
            })
            .collect();

        // Orthorectified products carry the band axis at the root
        let wavelengths = if file.dimension("wavelengths").is_some() {
            read_f64(&file, None, "wavelengths")?
        } else {
            read_f64(&file, Some(BAND_GROUP), "wavelengths")?
        };
        if wavelengths.len() != shape.2 {
            return Err(Error::shape("wavelength grid", shape.2, wavelengths.len()));
        }

        let mode = if file.variable("spatial_ref").is_some() {
            GeometryMode::Orthorectified
        } else {
            GeometryMode::SensorSpace(read_glt(&file)?)
        };
        debug!("Granule shape {:?}, geometry {}", shape, mode);

        Ok(Self {
            path,
            shape,
            wavelengths,
            attributes,
            mode,
        })
    }

    /// Row-sliceable view of the reflectance variable
    pub fn cube(&self) -> NetCdfCube {
        NetCdfCube {
            path: self.path.clone(),
            variable: REFLECTANCE.to_string(),
            shape: self.shape,
        }
    }
}

/// File-backed reflectance cube; each read opens its own handle
#[derive(Debug, Clone)]
pub struct NetCdfCube {
    pub path: PathBuf,
    pub variable: String,
    pub shape: (usize, usize, usize),
}

impl CubeSource for NetCdfCube {
    fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    fn read_rows(&self, range: RowRange) -> Result<Array3<f32>> {
        let (rows, cols, bands) = self.shape;
        if range.stop > rows || range.start > range.stop {
            return Err(Error::shape("row range", rows, range.stop));
        }
        let file = netcdf::open(&self.path)?;
        let var = file
            .variable(&self.variable)
            .ok_or_else(|| Error::MissingVariable(self.variable.clone()))?;
        let values: Vec<f32> = var.get_values::<f32, _>((range.start..range.stop, .., ..))?;
        Array3::from_shape_vec((range.len(), cols, bands), values)
            .map_err(|e| Error::external(e))
    }
}

fn reflectance_shape(file: &netcdf::File) -> Result<(usize, usize, usize)> {
    let var = file
        .variable(REFLECTANCE)
        .ok_or_else(|| Error::MissingVariable(REFLECTANCE.to_string()))?;
    let dims = var.dimensions();
    if dims.len() != 3 {
        return Err(Error::shape("reflectance dimensions", 3, dims.len()));
    }
    Ok((dims[0].len(), dims[1].len(), dims[2].len()))
}

fn read_f64(file: &netcdf::File, group: Option<&str>, name: &str) -> Result<Vec<f64>> {
    let qualified = || match group {
        Some(g) => format!("{}/{}", g, name),
        None => name.to_string(),
    };
    match group {
        Some(g) => {
            let group = file
                .group(g)?
                .ok_or_else(|| Error::MissingVariable(g.to_string()))?;
            let var = group
                .variable(name)
                .ok_or_else(|| Error::MissingVariable(qualified()))?;
            Ok(var.get_values::<f64, _>(..)?)
        }
        None => {
            let var = file
                .variable(name)
                .ok_or_else(|| Error::MissingVariable(qualified()))?;
            Ok(var.get_values::<f64, _>(..)?)
        }
    }
}

fn read_glt(file: &netcdf::File) -> Result<Glt> {
    let group = file
        .group(LOCATION_GROUP)?
        .ok_or_else(|| Error::MissingVariable(LOCATION_GROUP.to_string()))?;
    let read = |name: &str| -> Result<Array2<i32>> {
        let var = group
            .variable(name)
            .ok_or_else(|| Error::MissingVariable(format!("{}/{}", LOCATION_GROUP, name)))?;
        let dims = var.dimensions();
        if dims.len() != 2 {
            return Err(Error::shape("glt dimensions", 2, dims.len()));
        }
        let shape = (dims[0].len(), dims[1].len());
        let values: Vec<i32> = var.get_values::<i32, _>(..)?;
        Array2::from_shape_vec(shape, values).map_err(|e| Error::external(e))
    };
    Glt::new(read("glt_x")?, read("glt_y")?)
}
