use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

use emitwater::granule::{Timestamped, concurrent_match};
use emitwater::{Error, OciGranule};

const LINES: usize = 3;
const PIXELS: usize = 4;
const BANDS: usize = 5;
const FILL: i16 = -32767;

fn wavelengths() -> Vec<f64> {
    vec![346.0, 400.0, 442.0, 555.0, 670.0]
}

/// Packed Rrs; pixel (1, 2) is fill in every band
fn rrs_raw() -> Vec<i16> {
    let mut raw = Vec::with_capacity(LINES * PIXELS * BANDS);
    for line in 0..LINES {
        for pixel in 0..PIXELS {
            for band in 0..BANDS {
                raw.push(if (line, pixel) == (1, 2) {
                    FILL
                } else {
                    (100 * band + 10 * line + pixel) as i16
                });
            }
        }
    }
    raw
}

fn write_oci(dir: &Path, with_bands: bool) -> PathBuf {
    let path = dir.join("PACE_OCI.20240501T183000.L2.OC_AOP.V2_0.nc");
    let mut file = netcdf::create(&path).unwrap();
    file.add_dimension("number_of_lines", LINES).unwrap();
    file.add_dimension("pixels_per_line", PIXELS).unwrap();
    file.add_attribute("time_coverage_start", "2024-05-01T18:30:00.000Z").unwrap();
    file.add_attribute("instrument", "OCI").unwrap();

    if with_bands {
        file.add_dimension("wavelength_3d", BANDS).unwrap();
        let mut group = file.add_group("sensor_band_parameters").unwrap();
        let mut wl = group.add_variable::<f64>("wavelength_3d", &["wavelength_3d"]).unwrap();
        wl.put_values(&wavelengths(), ..).unwrap();
    }
    {
        let mut group = file.add_group("geophysical_data").unwrap();
        if with_bands {
            let mut rrs = group
                .add_variable::<i16>("Rrs", &["number_of_lines", "pixels_per_line", "wavelength_3d"])
                .unwrap();
            rrs.put_values(&rrs_raw(), ..).unwrap();
            rrs.put_attribute("_FillValue", FILL).unwrap();
            rrs.put_attribute("scale_factor", 2.0e-6_f32).unwrap();
            rrs.put_attribute("add_offset", 0.05_f32).unwrap();
            rrs.put_attribute("units", "sr^-1").unwrap();
        }
        let chl: Vec<f32> = (0..LINES * PIXELS).map(|i| 0.1 * i as f32).collect();
        let mut var = group
            .add_variable::<f32>("chlor_a", &["number_of_lines", "pixels_per_line"])
            .unwrap();
        var.put_values(&chl, ..).unwrap();
    }
    {
        let mut group = file.add_group("navigation_data").unwrap();
        let lat: Vec<f32> = (0..LINES * PIXELS).map(|i| 34.0 + 0.01 * (i / PIXELS) as f32).collect();
        let lon: Vec<f32> = (0..LINES * PIXELS).map(|i| -120.0 + 0.01 * (i % PIXELS) as f32).collect();
        {
            let mut var = group
                .add_variable::<f32>("latitude", &["number_of_lines", "pixels_per_line"])
                .unwrap();
            var.put_values(&lat, ..).unwrap();
        }
        let mut var = group
            .add_variable::<f32>("longitude", &["number_of_lines", "pixels_per_line"])
            .unwrap();
        var.put_values(&lon, ..).unwrap();
    }
    path
}

#[test]
fn groups_are_flattened_into_one_granule() {
    let dir = tempdir().unwrap();
    let granule = OciGranule::open(write_oci(dir.path(), true)).unwrap();

    assert_eq!(granule.variables.len(), 2);
    let rrs = granule.variable("Rrs").unwrap();
    assert_eq!(rrs.data.shape(), &[LINES, PIXELS, BANDS]);
    assert_eq!(rrs.units.as_deref(), Some("sr^-1"));
    // raw 100 * 3 + 10 * 2 + 1 = 321 at (2, 1, 3)
    assert_abs_diff_eq!(rrs.data[[2, 1, 3]], 0.05 + 321.0 * 2.0e-6, epsilon = 1e-6);
    assert!(rrs.data[[1, 2, 0]].is_nan());
    assert_eq!(granule.band_axis("Rrs"), Some(&wavelengths()[..]));
    assert_eq!(granule.band_axis("chlor_a"), None);

    assert_eq!(granule.latitude.dim(), (LINES, PIXELS));
    let [w, s, e, n] = granule.bounds().unwrap();
    assert_abs_diff_eq!(w, -120.0, epsilon = 1e-5);
    assert_abs_diff_eq!(e, -119.97, epsilon = 1e-5);
    assert_abs_diff_eq!(s, 34.0, epsilon = 1e-5);
    assert_abs_diff_eq!(n, 34.02, epsilon = 1e-5);
    assert!(granule.attributes.contains_key("instrument"));
}

#[test]
fn band_group_is_optional() {
    let dir = tempdir().unwrap();
    let granule = OciGranule::open(write_oci(dir.path(), false)).unwrap();
    assert!(granule.coordinates.is_empty());
    assert_eq!(granule.variable("chlor_a").unwrap().data.ndim(), 2);
}

#[test]
fn missing_navigation_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("number_of_lines", LINES).unwrap();
        file.add_group("geophysical_data").unwrap();
    }
    let err = OciGranule::open(&path).unwrap_err();
    assert!(matches!(err, Error::MissingVariable(ref g) if g == "navigation_data"), "{err}");
}

#[test]
fn granule_time_drives_concurrent_matching() {
    let dir = tempdir().unwrap();
    let granule = OciGranule::open(write_oci(dir.path(), true)).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap();
    assert_eq!(granule.timestamp(), Some(start));

    let emit_times = [start + Duration::minutes(20), start + Duration::hours(3)];
    let (pace, emit) = concurrent_match(std::slice::from_ref(&granule), &emit_times, Duration::minutes(30));
    assert_eq!(pace.len(), 1);
    assert_eq!(emit, vec![&emit_times[0]]);
}
