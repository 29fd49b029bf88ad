//! Liquid water absorption over the fitting window.
//!
//! The imaginary part of the refractive index of liquid water, `k(λ)`, is read
//! from a reference CSV table and linearly interpolated onto the instrument
//! wavelengths between the two feature shoulders. The absorption coefficient is
//! `α(λ) = 4πk/λ` in nm⁻¹. The window depends only on the wavelength grid, so a
//! job builds it once and shares it across all workers.
use std::f64::consts::PI;
use std::path::Path;

use tracing::debug;

use crate::core::params::TableSpec;
use crate::error::{Error, Result};

/// Imaginary refractive index of liquid water by wavelength (nm), ascending
#[derive(Debug, Clone, PartialEq)]
pub struct RefractiveIndexTable {
    wavelengths: Vec<f64>,
    k: Vec<f64>,
}

impl RefractiveIndexTable {
    pub fn new(wavelengths: Vec<f64>, k: Vec<f64>) -> Result<Self> {
        if wavelengths.len() != k.len() {
            return Err(Error::shape("refractive index table", wavelengths.len(), k.len()));
        }
        if wavelengths.is_empty() {
            return Err(Error::InvalidArgument {
                arg: "refractive_index_table",
                value: "empty".to_string(),
            });
        }
        if wavelengths.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::InvalidArgument {
                arg: "refractive_index_table",
                value: "wavelengths not ascending".to_string(),
            });
        }
        Ok(Self { wavelengths, k })
    }

    /// Load the table described by `spec` from CSV
    pub fn from_spec(spec: &TableSpec) -> Result<Self> {
        Self::from_csv_path(&spec.path, &spec.wavelength_column, &spec.k_column, spec.rows)
    }

    pub fn from_csv_path(
        path: &Path,
        wavelength_column: &str,
        k_column: &str,
        rows: usize,
    ) -> Result<Self> {
        let reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let table = Self::from_csv_reader(reader, wavelength_column, k_column, rows)?;
        debug!(
            "Loaded refractive index table {:?} ({} rows)",
            path,
            table.len()
        );
        Ok(table)
    }

    pub fn from_csv_reader<R: std::io::Read>(
        mut reader: csv::Reader<R>,
        wavelength_column: &str,
        k_column: &str,
        rows: usize,
    ) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| Error::MissingVariable(name.to_string()))
        };
        let wl_idx = column(wavelength_column)?;
        let k_idx = column(k_column)?;

        let mut wavelengths = Vec::new();
        let mut k = Vec::new();
        for record in reader.records().take(rows) {
            let record = record?;
            wavelengths.push(parse_cell(&record, wl_idx, wavelength_column)?);
            k.push(parse_cell(&record, k_idx, k_column)?);
        }
        Self::new(wavelengths, k)
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// Linear interpolation of k, clamped to the end values outside the table
    pub fn interpolate(&self, wavelength: f64) -> f64 {
        interp(wavelength, &self.wavelengths, &self.k)
    }
}

fn parse_cell(record: &csv::StringRecord, idx: usize, column: &str) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|_| Error::InvalidArgument {
        arg: "refractive_index_table",
        value: format!("{}={}", column, raw),
    })
}

/// numpy-style `interp`: `xp` ascending, clamps outside `[xp[0], xp[n-1]]`
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // first index with xp[i] > x
    let hi = xp.partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return fp[lo];
    }
    fp[lo] + (fp[hi] - fp[lo]) * (x - xp[lo]) / span
}

/// Index of the grid value closest to `target`; the first one wins on ties
pub fn nearest_index(grid: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in grid.iter().enumerate() {
        let d = (target - v).abs();
        match best {
            Some((_, bd)) if !(d < bd) => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

/// Fitting window between the two shoulders, inclusive of both ends
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorptionWindow {
    /// Index of the left shoulder in the full wavelength grid
    pub left: usize,
    /// Index of the right shoulder in the full wavelength grid (inclusive)
    pub right: usize,
    /// Wavelengths inside the window (nm)
    pub wavelengths: Vec<f64>,
    /// Absorption coefficient of liquid water (nm⁻¹)
    pub coefficients: Vec<f64>,
}

impl AbsorptionWindow {
    pub fn new(
        grid: &[f64],
        left_shoulder: f64,
        right_shoulder: f64,
        table: &RefractiveIndexTable,
    ) -> Result<Self> {
        let (left, right) = shoulder_indices(grid, left_shoulder, right_shoulder)?;
        let wavelengths = grid[left..=right].to_vec();
        let coefficients = wavelengths
            .iter()
            .map(|&wl| 4.0 * PI * table.interpolate(wl) / wl)
            .collect();
        Ok(Self {
            left,
            right,
            wavelengths,
            coefficients,
        })
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// The slice of a full spectrum that falls inside the window
    pub fn select<'a>(&self, spectrum: &'a [f32]) -> &'a [f32] {
        &spectrum[self.left..=self.right]
    }
}

/// Inclusive index bounds of the window between two shoulder wavelengths
pub fn shoulder_indices(
    grid: &[f64],
    left_shoulder: f64,
    right_shoulder: f64,
) -> Result<(usize, usize)> {
    let left = nearest_index(grid, left_shoulder).ok_or_else(|| Error::shape("wavelength grid", 1, 0))?;
    let right = nearest_index(grid, right_shoulder).ok_or_else(|| Error::shape("wavelength grid", 1, 0))?;
    if right < left {
        return Err(Error::InvalidArgument {
            arg: "shoulders",
            value: format!("right index {} precedes left index {}", right, left),
        });
    }
    Ok((left, right))
}
