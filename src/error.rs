//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, NetCDF, GDAL, CSV, JSON and HTTP errors, and provides
//! semantic variants for malformed granules, shape mismatches and argument validation.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Missing variable `{0}` in granule")]
    MissingVariable(String),

    #[error("Missing attribute `{0}` in granule metadata")]
    MissingAttribute(String),

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Granule does not contain bounding rectangles or polygons: {0}")]
    UnsupportedGeometry(String),

    #[error("No assets found matching: {0}")]
    NoMatchingAssets(String),

    #[error("Worker for rows {start}..{stop} failed: {source}")]
    Worker {
        start: usize,
        stop: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    pub(crate) fn shape(context: &'static str, expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch {
            context,
            expected,
            actual,
        }
    }
}
