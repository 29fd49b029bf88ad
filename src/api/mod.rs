//! High-level, ergonomic library API: estimate water content for one granule or a
//! directory of granules, and the notebook-style helpers for
//! search results, AOIs and zonal extraction. Prefer these entrypoints over the
//! low-level `core` modules when integrating emitwater.
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::aoi::{Aoi, DrawnPolygon, create_aoi_collection, read_aois};
use crate::core::job::{JobReport, run};
use crate::core::params::EwtParams;
use crate::core::zonal::{Extraction, extract_raster_values};
use crate::error::{Error, Result};
use crate::granule::{Granule, GranuleSummary, load_granules, results_summary};
use crate::io::gdal::GeoRaster;

/// Batch processing report
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub outputs: Vec<PathBuf>,
}

/// True for EMIT L2A reflectance granules (`EMIT_L2A_RFL_*.nc`), excluding the
/// uncertainty product
pub fn is_reflectance_granule(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    name.starts_with("EMIT_L2A_RFL_") && name.ends_with(".nc")
}

/// Return an iterator over reflectance granules directly inside `input_dir`, sorted by name
pub fn iterate_granules(input_dir: &Path) -> Result<std::vec::IntoIter<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() && is_reflectance_granule(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter())
}

/// Estimate water content for one granule, writing `<basename>_cwc.tif` into `output_dir`
pub fn process_granule_to_dir(input: &Path, output_dir: &Path, params: &EwtParams) -> Result<JobReport> {
    run(input, output_dir, params)
}

/// Process every reflectance granule of `input_dir` into `output_dir`.
/// Granules whose output already exists are skipped. If `continue_on_error` is
/// true, errors are counted in the report and processing continues; otherwise the
/// first error is returned.
pub fn process_directory_to_path(
    input_dir: &Path,
    output_dir: &Path,
    params: &EwtParams,
    continue_on_error: bool,
) -> Result<BatchReport> {
    std::fs::create_dir_all(output_dir)?;
    let mut report = BatchReport::default();

    for path in iterate_granules(input_dir)? {
        let expected = output_dir.join(crate::core::job::output_file_name(&path));
        if expected.exists() {
            info!("Output {:?} exists, skipping", expected);
            report.skipped += 1;
            continue;
        }
        match run(&path, output_dir, params) {
            Ok(job) => {
                report.processed += 1;
                report.outputs.push(job.output);
            }
            Err(e) => {
                error!("Failed to process {:?}: {}", path, e);
                report.errors += 1;
                if !continue_on_error {
                    return Err(e);
                }
            }
        }
    }

    if report.processed == 0 && report.errors == 0 && report.skipped == 0 {
        warn!("No EMIT_L2A_RFL_*.nc granules found in {:?}", input_dir);
    }
    Ok(report)
}

/// Load search results from JSON and flatten them into summary rows
pub fn summarize_search_results(path: &Path) -> Result<(Vec<Granule>, Vec<GranuleSummary>)> {
    let granules = load_granules(path)?;
    let summary = results_summary(&granules)?;
    Ok((granules, summary))
}

/// Build AOIs from drawn polygons
pub fn aois_from_drawn(polygons: &[DrawnPolygon], transform_needed: bool) -> Result<Vec<Aoi>> {
    if polygons.is_empty() {
        return Err(Error::InvalidArgument {
            arg: "polygons",
            value: "none drawn".to_string(),
        });
    }
    create_aoi_collection(polygons, transform_needed)
}

/// Extract raster values under the AOIs of a GeoJSON file
pub fn extract_from_paths(raster: &Path, aois: &Path, summary: bool) -> Result<Extraction> {
    let raster = GeoRaster::open(raster)?;
    let aois = read_aois(aois)?;
    extract_raster_values(&raster, &aois, summary)
}
