//! Output writers: the water content GeoTIFF and its embedded metadata.
pub mod metadata;
pub mod tiff;
