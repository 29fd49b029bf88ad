//! Row-sliceable access to a reflectance cube.
//!
//! Workers never share a live file handle: every `read_rows` call on a file-backed
//! source opens its own handle, reads the requested rows and drops it.
use ndarray::{Array3, s};

use crate::error::{Error, Result};
use crate::types::RowRange;

/// A (row, column, wavelength) reflectance cube that can be read in row slices
pub trait CubeSource: Sync {
    /// (rows, columns, bands)
    fn shape(&self) -> (usize, usize, usize);

    /// Read rows `[range.start, range.stop)` as an owned (rows, columns, bands) array
    fn read_rows(&self, range: RowRange) -> Result<Array3<f32>>;
}

/// Cube held in memory; used for synthetic data and tests
#[derive(Debug, Clone)]
pub struct InMemoryCube {
    data: Array3<f32>,
}

impl InMemoryCube {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }
}

impl CubeSource for InMemoryCube {
    fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    fn read_rows(&self, range: RowRange) -> Result<Array3<f32>> {
        let rows = self.data.dim().0;
        if range.stop > rows || range.start > range.stop {
            return Err(Error::shape("row range", rows, range.stop));
        }
        Ok(self.data.slice(s![range.start..range.stop, .., ..]).to_owned())
    }
}
