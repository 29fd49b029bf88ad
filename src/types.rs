//! Shared types and enums used across emitwater.
//! Includes `GeometryMode`, `FitStatus`, `AssetScheme` and the `RowRange` unit of work.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::ortho::Glt;

/// How a granule's pixels relate to the map grid. Decided once when the job starts.
#[derive(Debug, Clone)]
pub enum GeometryMode {
    /// Rows and columns are already on a map grid (a `spatial_ref` variable is present)
    Orthorectified,
    /// Raw downtrack/crosstrack pixels; the GLT maps them onto the map grid
    SensorSpace(Glt),
}

impl std::fmt::Display for GeometryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryMode::Orthorectified => write!(f, "Orthorectified"),
            GeometryMode::SensorSpace(glt) => {
                let (rows, cols) = glt.dim();
                write!(f, "SensorSpace(glt {}x{})", rows, cols)
            }
        }
    }
}

/// Outcome of a single bounded least-squares solve
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum FitStatus {
    /// A tolerance criterion was met
    Converged,
    /// The evaluation cap was hit; the last iterate is returned as-is
    MaxEvaluations,
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitStatus::Converged => write!(f, "Converged"),
            FitStatus::MaxEvaluations => write!(f, "MaxEvaluations"),
        }
    }
}

/// URL scheme used when selecting granule assets
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum AssetScheme {
    Https,
    S3,
}

impl AssetScheme {
    pub fn prefix(&self) -> &'static str {
        match self {
            AssetScheme::Https => "https://",
            AssetScheme::S3 => "s3://",
        }
    }
}

impl std::fmt::Display for AssetScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetScheme::Https => write!(f, "Https"),
            AssetScheme::S3 => write!(f, "S3"),
        }
    }
}

/// Half-open row interval `[start, stop)` handled by one worker
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub stop: usize,
}

impl RowRange {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
