//! Orthorectification through a geometry lookup table (GLT).
//!
//! Each cell of the GLT grid holds the 1-based (row, column) of the sensor-space
//! pixel that lands there; 0 means no coverage.
use ndarray::Array2;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Glt {
    /// 1-based crosstrack (column) index per map cell
    pub glt_x: Array2<i32>,
    /// 1-based downtrack (row) index per map cell
    pub glt_y: Array2<i32>,
}

impl Glt {
    pub fn new(glt_x: Array2<i32>, glt_y: Array2<i32>) -> Result<Self> {
        if glt_x.dim() != glt_y.dim() {
            return Err(Error::shape("glt", glt_x.len(), glt_y.len()));
        }
        Ok(Self { glt_x, glt_y })
    }

    /// (map rows, map columns)
    pub fn dim(&self) -> (usize, usize) {
        self.glt_x.dim()
    }
}

/// Resample a sensor-space raster onto the GLT grid, `fill` where uncovered
pub fn orthorectify<T: Copy>(data: &Array2<T>, glt: &Glt, fill: T) -> Array2<T> {
    let (rows, cols) = data.dim();
    let mut out = Array2::from_elem(glt.dim(), fill);
    ndarray::Zip::from(&mut out)
        .and(&glt.glt_x)
        .and(&glt.glt_y)
        .for_each(|cell, &gx, &gy| {
            if gx <= 0 || gy <= 0 {
                return;
            }
            let (r, c) = ((gy - 1) as usize, (gx - 1) as usize);
            if r < rows && c < cols {
                *cell = data[[r, c]];
            }
        });
    out
}
