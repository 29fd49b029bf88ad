//! Beer-Lambert liquid water inversion for a single reflectance spectrum.
//!
//! State vector `x = (path length [cm], intercept, slope [nm⁻¹])`. The modelled
//! reflectance over the fitting window is
//!
//! ```text
//! ρ(λ) = (x1 + x2·λ) · exp(-x0 · 1e7 · α(λ))
//! ```
//!
//! with `α` in nm⁻¹ (hence the 1e7 factor to cm⁻¹). A path length in cm of liquid
//! water equals a water content in g/cm².
use serde::Serialize;

use crate::core::absorption::{AbsorptionWindow, RefractiveIndexTable};
use crate::core::params::FitOptions;
use crate::core::solver::{SolveOptions, solve_bounded};
use crate::error::{Error, Result};
use crate::types::FitStatus;

/// nm⁻¹ to cm⁻¹
const NM_TO_CM: f64 = 1e7;

/// Result of one pixel fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelFit {
    /// Liquid water path length (cm), i.e. water content (g/cm²)
    pub path_length: f64,
    pub intercept: f64,
    pub slope: f64,
    pub status: FitStatus,
    pub evaluations: usize,
}

impl PixelFit {
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }
}

/// Modelled reflectance for state `x` over the window
pub fn beer_lambert_model(x: &[f64; 3], wavelengths: &[f64], coefficients: &[f64]) -> Vec<f64> {
    wavelengths
        .iter()
        .zip(coefficients)
        .map(|(&wl, &alpha)| (x[1] + x[2] * wl) * (-x[0] * NM_TO_CM * alpha).exp())
        .collect()
}

/// Residuals `model - measured` written into `out`
pub fn beer_lambert_residuals(
    x: &[f64; 3],
    measured: &[f32],
    window: &AbsorptionWindow,
    out: &mut Vec<f64>,
) {
    out.clear();
    out.extend(
        window
            .wavelengths
            .iter()
            .zip(&window.coefficients)
            .zip(measured)
            .map(|((&wl, &alpha), &y)| {
                (x[1] + x[2] * wl) * (-x[0] * NM_TO_CM * alpha).exp() - y as f64
            }),
    );
}

/// True when every value is negative, i.e. the pixel carries no usable signal
pub fn all_negative(spectrum: &[f32]) -> bool {
    spectrum.iter().all(|&v| v < 0.0)
}

/// Fit a full spectrum against a precomputed window.
///
/// The spectrum must reach at least to the window's right shoulder band.
pub fn fit_window(spectrum: &[f32], window: &AbsorptionWindow, options: &FitOptions) -> Result<PixelFit> {
    if spectrum.len() <= window.right {
        return Err(Error::shape("spectrum bands", window.right + 1, spectrum.len()));
    }
    let measured = window.select(spectrum);
    let (lower, upper) = options.effective_bounds();
    let solve_options = SolveOptions {
        max_evaluations: options.max_evaluations,
        ..SolveOptions::default()
    };

    let solution = solve_bounded(
        |x: &[f64; 3], out: &mut Vec<f64>| beer_lambert_residuals(x, measured, window, out),
        options.initial_guess,
        lower,
        upper,
        &solve_options,
    );

    Ok(PixelFit {
        path_length: solution.x[0],
        intercept: solution.x[1],
        slope: solution.x[2],
        status: solution.status,
        evaluations: solution.evaluations,
    })
}

/// Fit a reflectance spectrum, building the absorption window for this call.
///
/// Prefer [`AbsorptionWindow::new`] + [`fit_window`] when fitting many spectra on
/// the same wavelength grid.
pub fn fit(
    spectrum: &[f32],
    wavelengths: &[f64],
    table: &RefractiveIndexTable,
    options: &FitOptions,
) -> Result<PixelFit> {
    if spectrum.len() != wavelengths.len() {
        return Err(Error::shape("spectrum", wavelengths.len(), spectrum.len()));
    }
    let window = AbsorptionWindow::new(
        wavelengths,
        options.left_shoulder,
        options.right_shoulder,
        table,
    )?;
    fit_window(spectrum, &window, options)
}
