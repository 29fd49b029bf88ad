//! I/O layer for EMIT and PACE granules and GDAL-backed rasters.
//! Provides the `emit` and `pace` NetCDF readers, the row-sliceable `source` abstraction used by
//! workers, `gdal` raster reading for extraction, and `writers` for GeoTIFF output
//! and metadata embedding.
pub mod emit;
pub use emit::{EmitGranule, GranuleAttribute, NetCdfCube};

pub mod pace;
pub use pace::{OciGranule, OciVariable};

pub mod source;
pub use source::{CubeSource, InMemoryCube};

pub mod gdal;
pub use gdal::{GeoRaster, NamedBand, RasterMetadata, RasterReader};

pub mod writers;
