//! Row-range worker: fits every pixel of a contiguous block of rows.
use ndarray::{Array2, s};
use tracing::debug;

use crate::core::absorption::AbsorptionWindow;
use crate::core::inversion::{PixelFit, all_negative, fit_window};
use crate::core::params::{FitOptions, NODATA};
use crate::error::{Error, Result};
use crate::io::source::CubeSource;
use crate::types::RowRange;

/// Water content for one row range plus per-pixel fit quality
#[derive(Debug, Clone)]
pub struct RangeOutput {
    pub range: RowRange,
    /// Path length per pixel (g/cm²), `NODATA` where skipped
    pub water: Array2<f32>,
    /// False where the solver stopped on the evaluation cap or the pixel was skipped
    pub converged: Array2<bool>,
    pub fitted: usize,
    pub skipped: usize,
    pub not_converged: usize,
}

/// Read `range` from `source` and fit every pixel that carries signal.
///
/// NaN reflectances are replaced by `NODATA` first. A pixel whose values are all
/// negative keeps `NODATA` and the model is not evaluated for it.
pub fn process_range<S: CubeSource + ?Sized>(
    source: &S,
    window: &AbsorptionWindow,
    options: &FitOptions,
    range: RowRange,
) -> Result<RangeOutput> {
    process_range_with(source, window, range, |spectrum| fit_window(spectrum, window, options))
}

/// Same as [`process_range`] with the per-pixel fit supplied by the caller
pub fn process_range_with<S, F>(
    source: &S,
    window: &AbsorptionWindow,
    range: RowRange,
    mut fit: F,
) -> Result<RangeOutput>
where
    S: CubeSource + ?Sized,
    F: FnMut(&[f32]) -> Result<PixelFit>,
{
    let mut rfl = source.read_rows(range)?;
    let (rows, cols, bands) = rfl.dim();
    if rows != range.len() {
        return Err(Error::shape("worker rows", range.len(), rows));
    }
    if bands <= window.right {
        return Err(Error::shape("spectrum bands", window.right + 1, bands));
    }
    rfl.mapv_inplace(|v| if v.is_nan() { NODATA } else { v });

    let mut water = Array2::<f32>::from_elem((rows, cols), NODATA);
    let mut converged = Array2::<bool>::from_elem((rows, cols), false);
    let mut fitted = 0;
    let mut skipped = 0;
    let mut not_converged = 0;
    let mut spectrum = Vec::with_capacity(bands);

    for r in 0..rows {
        for c in 0..cols {
            spectrum.clear();
            spectrum.extend(rfl.slice(s![r, c, ..]).iter().copied());
            if all_negative(&spectrum) {
                skipped += 1;
                continue;
            }
            let result = fit(&spectrum)?;
            water[[r, c]] = result.path_length as f32;
            converged[[r, c]] = result.converged();
            fitted += 1;
            if !result.converged() {
                not_converged += 1;
            }
        }
        debug!("CWC writing line {}", range.start + r);
    }

    Ok(RangeOutput {
        range,
        water,
        converged,
        fitted,
        skipped,
        not_converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inversion::tests::{synthetic_spectrum, test_grid, test_table};
    use crate::io::source::InMemoryCube;
    use crate::types::FitStatus;
    use ndarray::Array3;

    fn window() -> AbsorptionWindow {
        AbsorptionWindow::new(&test_grid(), 850.0, 1100.0, &test_table()).unwrap()
    }

    fn cube_with_dead_pixel() -> InMemoryCube {
        let grid = test_grid();
        let table = test_table();
        let spectrum = synthetic_spectrum([0.1, 0.3, 0.0001], &grid, &table);
        let mut data = Array3::<f32>::zeros((3, 2, grid.len()));
        for r in 0..3 {
            for c in 0..2 {
                for (b, v) in spectrum.iter().enumerate() {
                    data[[r, c, b]] = *v;
                }
            }
        }
        // all negative (fill) pixel
        for b in 0..grid.len() {
            data[[1, 1, b]] = if b % 2 == 0 { -9999.0 } else { -0.01 };
        }
        // NaN pixel, becomes all-negative after fill replacement
        for b in 0..grid.len() {
            data[[2, 0, b]] = f32::NAN;
        }
        InMemoryCube::new(data)
    }

    #[test]
    fn test_negative_pixels_are_skipped_without_fitting() {
        let cube = cube_with_dead_pixel();
        let window = window();
        let mut calls = 0;
        let out = process_range_with(&cube, &window, RowRange::new(0, 3), |s| {
            calls += 1;
            assert!(!all_negative(s));
            Ok(PixelFit {
                path_length: 0.25,
                intercept: 0.3,
                slope: 0.0,
                status: FitStatus::Converged,
                evaluations: 1,
            })
        })
        .unwrap();

        assert_eq!(calls, 4);
        assert_eq!(out.skipped, 2);
        assert_eq!(out.fitted, 4);
        assert_eq!(out.water[[1, 1]], NODATA);
        assert_eq!(out.water[[2, 0]], NODATA);
        assert!(!out.converged[[1, 1]]);
        assert_eq!(out.water[[0, 0]], 0.25);
    }

    #[test]
    fn test_process_range_fits_signal() {
        let cube = cube_with_dead_pixel();
        let window = window();
        let out = process_range(&cube, &window, &FitOptions::default(), RowRange::new(0, 1)).unwrap();
        assert_eq!(out.water.dim(), (1, 2));
        for v in out.water.iter() {
            assert!((v - 0.1).abs() < 5e-3, "got {}", v);
        }
    }

    #[test]
    fn test_out_of_bounds_range_fails() {
        let cube = cube_with_dead_pixel();
        let err = process_range(&cube, &window(), &FitOptions::default(), RowRange::new(2, 5));
        assert!(err.is_err());
    }
}
