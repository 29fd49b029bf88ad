use gdal::raster::ResampleAlg;
use gdal::{Dataset, Metadata};
use ndarray::Array2;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Metadata extracted from a GDAL-supported raster
#[derive(Debug, Clone)]
pub struct RasterMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection, `EPSG:<code>` when an authority is found, WKT otherwise
    pub projection: String,
}

/// A named band held in memory, no-data as NaN
#[derive(Debug, Clone)]
pub struct NamedBand {
    pub name: String,
    pub data: Array2<f64>,
}

/// Bands plus georeferencing, the input of zonal extraction
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub bands: Vec<NamedBand>,
    pub geotransform: [f64; 6],
    pub projection: String,
}

impl GeoRaster {
    pub fn new(bands: Vec<NamedBand>, geotransform: [f64; 6], projection: impl Into<String>) -> Result<Self> {
        let shape = bands.first().map(|b| b.data.dim());
        for band in &bands {
            if Some(band.data.dim()) != shape {
                return Err(Error::shape("raster band", shape.map_or(0, |s| s.0 * s.1), band.data.len()));
            }
        }
        Ok(Self {
            bands,
            geotransform,
            projection: projection.into(),
        })
    }

    /// (rows, columns)
    pub fn dim(&self) -> (usize, usize) {
        self.bands.first().map_or((0, 0), |b| b.data.dim())
    }

    /// Map coordinates of the center of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geotransform;
        let (c, r) = (col as f64 + 0.5, row as f64 + 0.5);
        (gt[0] + c * gt[1] + r * gt[2], gt[3] + c * gt[4] + r * gt[5])
    }

    /// Read all bands of a GDAL-supported raster (GeoTIFF, NetCDF, ENVI, ...)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = RasterReader::open(path)?;
        reader.read_all_bands()
    }
}

/// Reader for GDAL-backed rasters
pub struct RasterReader {
    pub dataset: Dataset,
    pub metadata: RasterMetadata,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

impl RasterReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(Error::MissingVariable("raster band".into()));
        }
        let geotransform = dataset
            .geo_transform()
            .unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let proj = dataset.projection();
        let projection = if proj.starts_with("EPSG:") {
            proj
        } else if let Some(code) = parse_epsg(&proj) {
            code
        } else {
            proj
        };
        debug!("Opened raster {}x{} with {} band(s)", size_x, size_y, bands);
        Ok(RasterReader {
            dataset,
            metadata: RasterMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
            },
        })
    }

    /// Read a single band (1-based index) as f64 of shape (height, width), no-data as NaN
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>> {
        if index == 0 || index > self.metadata.bands {
            return Err(Error::InvalidArgument {
                arg: "band",
                value: index.to_string(),
            });
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>((0, 0), window, window, Some(ResampleAlg::NearestNeighbour))?;
        let nodata = band.no_data_value();
        let data_vec: Vec<f64> = buf
            .data()
            .iter()
            .map(|&v| if Some(v) == nodata { f64::NAN } else { v })
            .collect();
        Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec)
            .map_err(Error::external)
    }

    /// Band description, else `value` for single-band rasters, else `band_<n>`
    pub fn band_name(&self, index: usize) -> Result<String> {
        let band = self.dataset.rasterband(index)?;
        let description = band.description().unwrap_or_default();
        Ok(if !description.is_empty() {
            description
        } else if self.metadata.bands == 1 {
            "value".to_string()
        } else {
            format!("band_{}", index)
        })
    }

    pub fn read_all_bands(&self) -> Result<GeoRaster> {
        let mut bands = Vec::with_capacity(self.metadata.bands);
        for idx in 1..=self.metadata.bands {
            bands.push(NamedBand {
                name: self.band_name(idx)?,
                data: self.read_band(idx)?,
            });
        }
        GeoRaster::new(bands, self.metadata.geotransform, self.metadata.projection.clone())
    }
}
