//! Water content job: one granule in, one GeoTIFF out.
//!
//! Everything that can fail cheaply (table, metadata, wavelength grid) is checked
//! before a single pixel is fitted. Rows are then split into contiguous ranges,
//! fitted on a dedicated thread pool and merged back in range order.
use ndarray::{Array2, Axis, concatenate};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::absorption::{AbsorptionWindow, RefractiveIndexTable};
use crate::core::ortho::orthorectify;
use crate::core::params::{EwtParams, FitOptions, NODATA};
use crate::core::partition::partition_rows;
use crate::core::worker::{RangeOutput, process_range};
use crate::error::{Error, Result};
use crate::io::emit::EmitGranule;
use crate::io::source::CubeSource;
use crate::io::writers::metadata::{OutputMetadata, select_output_metadata};
use crate::io::writers::tiff::{
    MASK_CONVERGED, MASK_NODATA, MASK_NOT_CONVERGED, write_converged_geotiff, write_cwc_geotiff,
};
use crate::types::GeometryMode;

/// Summary of a finished job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub output: PathBuf,
    /// Per-pixel convergence sidecar
    pub converged_output: PathBuf,
    /// Output raster size after orthorectification
    pub rows: usize,
    pub cols: usize,
    pub fitted: usize,
    pub skipped: usize,
    pub not_converged: usize,
}

/// Merged sensor-space result of all workers
#[derive(Debug, Clone)]
pub struct WaterContent {
    /// Path length per pixel (g/cm²), NaN where no fit was made
    pub water: Array2<f32>,
    pub converged: Array2<bool>,
    pub fitted: usize,
    pub skipped: usize,
    pub not_converged: usize,
}

/// `<basename before the first '.'>_cwc.tif`
pub fn output_file_name(input: &Path) -> String {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    format!("{}_cwc.tif", stem)
}

/// `<basename before the first '.'>_cwc_converged.tif`
pub fn converged_file_name(input: &Path) -> String {
    output_file_name(input).replace("_cwc.tif", "_cwc_converged.tif")
}

/// `MASK_CONVERGED` / `MASK_NOT_CONVERGED` per fitted pixel, `MASK_NODATA` elsewhere
pub fn convergence_mask(result: &WaterContent) -> Array2<u8> {
    let mut mask = Array2::from_elem(result.water.dim(), MASK_NODATA);
    ndarray::Zip::from(&mut mask)
        .and(&result.water)
        .and(&result.converged)
        .for_each(|m, &w, &ok| {
            if !w.is_nan() {
                *m = if ok { MASK_CONVERGED } else { MASK_NOT_CONVERGED };
            }
        });
    mask
}

/// Fit every row of `source` using `worker_count` workers and merge the results.
///
/// The pool lives for the duration of this call only. The first failing range
/// aborts the whole computation.
pub fn compute_water_content<S: CubeSource + ?Sized>(
    source: &S,
    window: &AbsorptionWindow,
    options: &FitOptions,
    worker_count: usize,
) -> Result<WaterContent> {
    let (rows, cols, _) = source.shape();
    let ranges = partition_rows(rows, worker_count);
    info!(
        "Processing {} rows in {} ranges with {} workers",
        rows,
        ranges.len(),
        worker_count.max(1)
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count.max(1))
        .thread_name(|i| format!("cwc-worker-{}", i))
        .build()
        .map_err(Error::external)?;

    let outputs: Vec<RangeOutput> = pool.install(|| {
        ranges
            .par_iter()
            .map(|&range| {
                process_range(source, window, options, range).map_err(|e| Error::Worker {
                    start: range.start,
                    stop: range.stop,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>>>()
    })?;

    merge_ranges(outputs, rows, cols)
}

/// Concatenate range outputs by ascending start row; sentinel pixels become NaN
pub fn merge_ranges(mut outputs: Vec<RangeOutput>, rows: usize, cols: usize) -> Result<WaterContent> {
    outputs.sort_by_key(|o| o.range.start);

    let mut water = if outputs.is_empty() {
        Array2::<f32>::zeros((0, cols))
    } else {
        let views: Vec<_> = outputs.iter().map(|o| o.water.view()).collect();
        concatenate(Axis(0), &views).map_err(Error::external)?
    };
    let converged = if outputs.is_empty() {
        Array2::<bool>::from_elem((0, cols), false)
    } else {
        let views: Vec<_> = outputs.iter().map(|o| o.converged.view()).collect();
        concatenate(Axis(0), &views).map_err(Error::external)?
    };
    if water.nrows() != rows {
        return Err(Error::shape("merged rows", rows, water.nrows()));
    }
    water.mapv_inplace(|v| if v == NODATA { f32::NAN } else { v });

    Ok(WaterContent {
        water,
        converged,
        fitted: outputs.iter().map(|o| o.fitted).sum(),
        skipped: outputs.iter().map(|o| o.skipped).sum(),
        not_converged: outputs.iter().map(|o| o.not_converged).sum(),
    })
}

/// Estimate equivalent water thickness for an EMIT reflectance granule and write
/// `<basename>_cwc.tif` into `output_dir`.
pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(filepath: P, output_dir: Q, params: &EwtParams) -> Result<JobReport> {
    let filepath = filepath.as_ref();
    let output_dir = output_dir.as_ref();
    params.fit.validate()?;

    let granule = EmitGranule::open(filepath)?;
    let table = RefractiveIndexTable::from_spec(&params.table)?;
    let metadata = select_output_metadata(&granule.attributes)?;
    let wavelengths: Arc<[f64]> = granule.wavelengths.clone().into();
    let window = AbsorptionWindow::new(
        &wavelengths,
        params.fit.left_shoulder,
        params.fit.right_shoulder,
        &table,
    )?;
    debug!(
        "Absorption window {}..={} ({} bands), detection limit {}",
        window.left,
        window.right,
        window.len(),
        params.detection_limit()
    );

    std::fs::create_dir_all(output_dir)?;
    let outputs = (
        output_dir.join(output_file_name(filepath)),
        output_dir.join(converged_file_name(filepath)),
    );
    let cube = granule.cube();
    write_water_content(&cube, &granule.mode, &window, &metadata, params, outputs)
}

/// Fit `source`, bring the result onto the map grid and write both rasters.
///
/// Nothing is written unless every range was fitted.
pub fn write_water_content<S: CubeSource + ?Sized>(
    source: &S,
    mode: &GeometryMode,
    window: &AbsorptionWindow,
    metadata: &OutputMetadata,
    params: &EwtParams,
    (output, converged_output): (PathBuf, PathBuf),
) -> Result<JobReport> {
    let result = compute_water_content(source, window, &params.fit, params.worker_count)?;
    if result.not_converged > 0 {
        warn!(
            "{} of {} pixels stopped on the evaluation cap",
            result.not_converged, result.fitted
        );
    }

    let mask = convergence_mask(&result);
    let (raster, mask) = match mode {
        GeometryMode::Orthorectified => (result.water, mask),
        GeometryMode::SensorSpace(glt) => {
            info!("Orthorectifying onto {:?} GLT grid", glt.dim());
            (
                orthorectify(&result.water, glt, f32::NAN),
                orthorectify(&mask, glt, MASK_NODATA),
            )
        }
    };

    write_cwc_geotiff(&output, &raster, metadata)?;
    write_converged_geotiff(&converged_output, &mask, metadata)?;
    let (rows, cols) = raster.dim();
    Ok(JobReport {
        output,
        converged_output,
        rows,
        cols,
        fitted: result.fitted,
        skipped: result.skipped,
        not_converged: result.not_converged,
    })
}
