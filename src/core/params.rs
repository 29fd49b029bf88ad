use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Numeric sentinel used for skipped or invalid pixels
pub const NODATA: f32 = -9999.0;

/// Default upper detection limit for liquid water path length (cm)
pub const DEFAULT_DETECTION_LIMIT: f64 = 0.5;

/// Parameters of a single Beer-Lambert spectral fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Left shoulder of the absorption feature (nm)
    pub left_shoulder: f64,
    /// Right shoulder of the absorption feature (nm)
    pub right_shoulder: f64,
    /// Initial (path length, intercept, slope)
    pub initial_guess: [f64; 3],
    /// Lower/upper bound per parameter
    pub bounds: [[f64; 2]; 3],
    /// Replaces the path length upper bound when set to anything but the default
    pub detection_limit: f64,
    /// Cap on residual evaluations (Jacobian evaluations excluded)
    pub max_evaluations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            left_shoulder: 850.0,
            right_shoulder: 1100.0,
            initial_guess: [0.02, 0.3, 0.0002],
            bounds: [[0.0, 0.5], [0.0, 1.0], [-0.0004, 0.0004]],
            detection_limit: DEFAULT_DETECTION_LIMIT,
            max_evaluations: 15,
        }
    }
}

impl FitOptions {
    pub fn with_detection_limit(mut self, detection_limit: f64) -> Self {
        self.detection_limit = detection_limit;
        self
    }

    /// Path length upper bound: a non-default detection limit wins over `bounds[0][1]`
    pub fn path_length_upper(&self) -> f64 {
        if self.detection_limit != DEFAULT_DETECTION_LIMIT {
            self.detection_limit
        } else {
            self.bounds[0][1]
        }
    }

    /// Bounds actually handed to the solver
    pub fn effective_bounds(&self) -> ([f64; 3], [f64; 3]) {
        let lower = [self.bounds[0][0], self.bounds[1][0], self.bounds[2][0]];
        let upper = [self.path_length_upper(), self.bounds[1][1], self.bounds[2][1]];
        (lower, upper)
    }

    pub fn validate(&self) -> Result<()> {
        let upper = self.path_length_upper();
        if upper.is_nan() || upper <= self.bounds[0][0] {
            return Err(Error::InvalidArgument {
                arg: "detection_limit",
                value: upper.to_string(),
            });
        }
        if self.left_shoulder >= self.right_shoulder {
            return Err(Error::InvalidArgument {
                arg: "shoulders",
                value: format!("{}..{}", self.left_shoulder, self.right_shoulder),
            });
        }
        if self.max_evaluations == 0 {
            return Err(Error::InvalidArgument {
                arg: "max_evaluations",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Where the liquid water refractive index table lives and which columns to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSpec {
    pub path: PathBuf,
    pub wavelength_column: String,
    pub k_column: String,
    /// Only the first `rows` records are used
    pub rows: usize,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/k_liquid_water_ice.csv"),
            wavelength_column: "wvl_6".to_string(),
            k_column: "T = 20°C".to_string(),
            rows: 982,
        }
    }
}

/// Job parameters suitable for config files and CLI overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EwtParams {
    /// Number of workers; the image is split into `worker_count - 1` row ranges
    pub worker_count: usize,
    pub fit: FitOptions,
    pub table: TableSpec,
}

impl Default for EwtParams {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            fit: FitOptions::default(),
            table: TableSpec::default(),
        }
    }
}

impl EwtParams {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let params: EwtParams = serde_json::from_reader(reader)?;
        Ok(params)
    }

    pub fn detection_limit(&self) -> f64 {
        self.fit.detection_limit
    }
}

/// Available parallelism minus one, never below one
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_bounds_use_detection_limit() {
        let opts = FitOptions::default();
        let (lower, upper) = opts.effective_bounds();
        assert_eq!(lower, [0.0, 0.0, -0.0004]);
        assert_eq!(upper, [0.5, 1.0, 0.0004]);

        let (_, upper) = opts.with_detection_limit(0.2).effective_bounds();
        assert_eq!(upper[0], 0.2);
    }

    #[test]
    fn test_caller_bounds_kept_with_default_limit() {
        let opts = FitOptions {
            bounds: [[0.0, 0.2], [0.0, 1.0], [-0.0004, 0.0004]],
            ..FitOptions::default()
        };
        assert_eq!(opts.effective_bounds().1[0], 0.2);
        assert_eq!(opts.with_detection_limit(0.3).effective_bounds().1[0], 0.3);
    }

    #[test]
    fn test_validate_rejects_empty_path_length_range() {
        let opts = FitOptions {
            bounds: [[0.3, 0.2], [0.0, 1.0], [-0.0004, 0.0004]],
            ..FitOptions::default()
        };
        assert!(opts.validate().is_err());
        assert!(FitOptions::default().with_detection_limit(0.0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_shoulders() {
        let opts = FitOptions {
            left_shoulder: 1100.0,
            right_shoulder: 850.0,
            ..FitOptions::default()
        };
        assert!(opts.validate().is_err());
        assert!(FitOptions::default().validate().is_ok());
    }

    #[test]
    fn test_params_from_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.json");
        let mut file = File::create(&path).unwrap();
        file.write_all(br#"{ "worker_count": 5, "fit": { "detection_limit": 0.3 } }"#)
            .unwrap();

        let params = EwtParams::from_file(&path).unwrap();
        assert_eq!(params.worker_count, 5);
        assert_eq!(params.detection_limit(), 0.3);
        assert_eq!(params.fit.max_evaluations, 15);
        assert_eq!(params.table.k_column, "T = 20°C");
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }
}
