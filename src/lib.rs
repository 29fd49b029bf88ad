#![doc = r#"
emitwater: EMIT / PACE notebook utilities with a parallel canopy water content engine.

This crate estimates equivalent water thickness (EWT), also called canopy water
content (CWC), from EMIT L2A surface reflectance by fitting a Beer-Lambert model to
the 970 nm liquid water absorption feature of every pixel. It also carries the
helpers a data-discovery workflow needs around it: granule footprints and asset
links from search results, AOIs from drawn polygons, raster extraction under
polygons, and granule download. It powers the `emitwater` CLI and can be embedded
in your own Rust applications.

Requirements
------------
- GDAL and NetCDF (with HDF5) development headers and runtime available on your system.
- Rust 2024 edition toolchain.
- The liquid water refractive index table (`k_liquid_water_ice.csv`, columns
  `wvl_6` and `T = 20°C`).

Quick start: one granule to a GeoTIFF
-------------------------------------
```rust,no_run
use std::path::Path;
use emitwater::{run, EwtParams};

fn main() -> emitwater::Result<()> {
    let mut params = EwtParams::default();
    params.worker_count = 8;
    params.fit.detection_limit = 0.5;
    params.table.path = "data/k_liquid_water_ice.csv".into();

    let report = run(
        Path::new("/data/EMIT_L2A_RFL_001_20230401T181052_2309112_006.nc"),
        Path::new("/out"),
        &params,
    )?;
    // -> /out/EMIT_L2A_RFL_001_20230401T181052_2309112_006_cwc.tif
    println!("{:?}: {} fitted, {} skipped", report.output, report.fitted, report.skipped);
    Ok(())
}
```

Fit a single spectrum
---------------------
```rust,no_run
use emitwater::{fit, FitOptions, RefractiveIndexTable};

fn water(spectrum: &[f32], wavelengths: &[f64]) -> emitwater::Result<f64> {
    let table = RefractiveIndexTable::from_csv_path(
        "data/k_liquid_water_ice.csv".as_ref(),
        "wvl_6",
        "T = 20°C",
        982,
    )?;
    let result = fit(spectrum, wavelengths, &table, &FitOptions::default())?;
    if !result.converged() {
        eprintln!("stopped after {} evaluations", result.evaluations);
    }
    Ok(result.path_length) // g/cm²
}
```

Search results, AOIs and extraction
-----------------------------------
```rust,no_run
use std::path::Path;
use emitwater::granule::{asset_urls, granule_geometry, load_granules, AssetFilter};
use emitwater::aoi::{create_aoi_collection, DrawnPolygon};
use emitwater::{extract_raster_values, GeoRaster};

fn main() -> emitwater::Result<()> {
    let granules = load_granules("results.json")?;
    let filter = AssetFilter { contains: vec!["RFL_".into()], ..AssetFilter::default() };
    for g in &granules {
        println!("{:?} {:?}", granule_geometry(g)?.bounds(), asset_urls(g, &filter)?);
    }

    let drawn = vec![DrawnPolygon { xs: vec![-1.33e7, -1.32e7, -1.32e7], ys: vec![4.08e6, 4.08e6, 4.09e6] }];
    let aois = create_aoi_collection(&drawn, true)?;
    let raster = GeoRaster::open(Path::new("/out/granule_cwc.tif"))?;
    extract_raster_values(&raster, &aois, true)?.save_csv("cwc_summary.csv")?;
    Ok(())
}
```

Error handling
--------------
All public functions return `emitwater::Result<T>`; match on `emitwater::Error` to handle
specific cases, e.g. a granule missing an attribute or a failed worker.

```rust,no_run
use std::path::Path;
use emitwater::{run, Error, EwtParams};

fn main() {
    match run(Path::new("/bad/granule.nc"), Path::new("/out"), &EwtParams::default()) {
        Ok(report) => println!("{:?}", report.output),
        Err(Error::MissingAttribute(name)) => eprintln!("granule lacks {name}"),
        Err(Error::Worker { start, stop, source }) => eprintln!("rows {start}..{stop}: {source}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level, ergonomic entry points (single granule, batch directory).
- [`core`]: absorption window, solver, inversion, partitioning, workers, job, zonal extraction.
- [`granule`]: UMM-G footprints, asset URLs, browse images, concurrent matching.
- [`aoi`], [`geometry`]: drawn polygons and coordinate helpers.
- [`io`]: EMIT and PACE OCI NetCDF readers, GDAL raster reader, GeoTIFF writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod aoi;
pub mod api;
pub mod core;
pub mod download;
pub mod error;
pub mod geometry;
pub mod granule;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::params::{EwtParams, FitOptions, NODATA, TableSpec};
pub use error::{Error, Result};
pub use types::{AssetScheme, FitStatus, GeometryMode, RowRange};

// Engine
pub use core::absorption::{AbsorptionWindow, RefractiveIndexTable};
pub use core::inversion::{PixelFit, fit};
pub use core::job::{JobReport, run};
pub use core::partition::partition_rows;
pub use core::zonal::{Extraction, extract_raster_values};

// Readers and writers
pub use io::emit::EmitGranule;
pub use io::pace::OciGranule;
pub use io::gdal::GeoRaster;
pub use io::writers::metadata::{ALLOW_LIST, OUTPUT_TITLE, select_output_metadata};

// High-level API re-exports
pub use api::{BatchReport, process_directory_to_path, process_granule_to_dir};
