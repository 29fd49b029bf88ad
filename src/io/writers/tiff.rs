use gdal::raster::{Buffer, ColorInterpretation, RasterCreationOptions};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::params::NODATA;
use crate::error::{Error, Result};
use crate::io::writers::metadata::{OutputMetadata, embed_tiff_metadata};

/// Band description written into the water content GeoTIFF
pub const BAND_DESCRIPTION: &str = "Canopy Water Content";
pub const BAND_UNITS: &str = "g/cm^2";

/// Band description of the convergence sidecar
pub const MASK_DESCRIPTION: &str = "Fit Converged";
/// Sidecar cell values: solver met a tolerance, stopped on the cap, no fit made
pub const MASK_CONVERGED: u8 = 1;
pub const MASK_NOT_CONVERGED: u8 = 0;
pub const MASK_NODATA: u8 = 255;

/// Creation options for every water content raster
fn creation_options() -> Result<RasterCreationOptions> {
    let mut options = RasterCreationOptions::new();
    options.set_name_value("TILED", "YES")?;
    options.set_name_value("COMPRESS", "DEFLATE")?;
    Ok(options)
}

/// Write a single-band f32 GeoTIFF. NaN cells are stored as `NODATA`.
pub fn write_tiff_f32(output: &Path, data: &Array2<f32>) -> Result<Dataset> {
    let (rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type_with_options::<f32, _>(
        output,
        cols,
        rows,
        1,
        &creation_options()?,
    )?;

    let values: Vec<f32> = data
        .iter()
        .map(|&v| if v.is_nan() { NODATA } else { v })
        .collect();
    let mut buf = Buffer::new((cols, rows), values);
    let mut band = ds.rasterband(1)?;
    band.set_no_data_value(Some(NODATA as f64))?;
    band.set_color_interpretation(ColorInterpretation::GrayIndex)?;
    band.set_description(BAND_DESCRIPTION)?;
    band.set_metadata_item("units", BAND_UNITS, "")?;
    band.write((0, 0), (cols, rows), &mut buf)?;
    Ok(ds)
}

/// Write a single-band u8 GeoTIFF with `MASK_NODATA` as no-data
pub fn write_tiff_u8(output: &Path, data: &Array2<u8>) -> Result<Dataset> {
    let (rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type_with_options::<u8, _>(
        output,
        cols,
        rows,
        1,
        &creation_options()?,
    )?;

    let mut buf = Buffer::new((cols, rows), data.iter().copied().collect::<Vec<u8>>());
    let mut band = ds.rasterband(1)?;
    band.set_no_data_value(Some(MASK_NODATA as f64))?;
    band.set_color_interpretation(ColorInterpretation::GrayIndex)?;
    band.set_description(MASK_DESCRIPTION)?;
    band.write((0, 0), (cols, rows), &mut buf)?;
    Ok(ds)
}

/// Build `output` inside a scratch directory next to it, then rename into place.
///
/// GDAL must have closed the staged file by the time `write` returns.
fn stage_and_rename<F>(output: &Path, write: F) -> Result<PathBuf>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = output.file_name().ok_or_else(|| Error::InvalidArgument {
        arg: "output",
        value: output.display().to_string(),
    })?;

    let scratch = tempfile::Builder::new().prefix(".cwc-").tempdir_in(&parent)?;
    let staged = scratch.path().join(file_name);
    write(&staged)?;
    debug!("Staged GeoTIFF at {:?}", staged);
    std::fs::rename(&staged, output)?;
    Ok(output.to_path_buf())
}

/// Write the water content raster with its metadata to `output`.
///
/// A failure never leaves a partial file behind.
pub fn write_cwc_geotiff(output: &Path, data: &Array2<f32>, metadata: &OutputMetadata) -> Result<PathBuf> {
    let path = stage_and_rename(output, |staged| {
        let mut ds = write_tiff_f32(staged, data)?;
        embed_tiff_metadata(&mut ds, metadata)
    })?;
    info!("Wrote {:?} ({}x{})", path, data.ncols(), data.nrows());
    Ok(path)
}

/// Write the per-pixel convergence mask next to the water content raster
pub fn write_converged_geotiff(output: &Path, mask: &Array2<u8>, metadata: &OutputMetadata) -> Result<PathBuf> {
    let path = stage_and_rename(output, |staged| {
        let mut ds = write_tiff_u8(staged, mask)?;
        embed_tiff_metadata(&mut ds, metadata)
    })?;
    info!("Wrote convergence mask {:?}", path);
    Ok(path)
}
