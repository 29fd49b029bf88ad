use gdal::Dataset;
use gdal::Metadata;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::io::emit::GranuleAttribute;

/// Root attributes carried over from the reflectance granule, in output order
pub const ALLOW_LIST: [&str; 13] = [
    "flight_line",
    "time_coverage_start",
    "time_coverage_end",
    "easternmost_longitude",
    "northernmost_latitude",
    "westernmost_longitude",
    "southernmost_latitude",
    "spatialResolution",
    "spatial_ref",
    "geotransform",
    "day_night_flag",
    "title",
    "granule_id",
];

pub const OUTPUT_TITLE: &str =
    "EMIT Estimated Equivalent Water Thickness (EWT) / Canopy Water Content (CWC)";

/// Metadata attached to the water content raster
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputMetadata {
    /// Allow-listed attributes as text, in `ALLOW_LIST` order
    pub items: Vec<(String, String)>,
    pub geotransform: Option<[f64; 6]>,
    /// WKT of the output grid
    pub projection: Option<String>,
}

impl OutputMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }
}

/// Keep exactly the allow-listed attributes and retitle the product.
///
/// Every allow-listed key must be present; a missing one fails the job before any
/// pixel is processed.
pub fn select_output_metadata(attributes: &BTreeMap<String, GranuleAttribute>) -> Result<OutputMetadata> {
    let mut meta = OutputMetadata::default();
    for key in ALLOW_LIST {
        let value = attributes
            .get(key)
            .ok_or_else(|| Error::MissingAttribute(key.to_string()))?;
        let text = if key == "title" {
            OUTPUT_TITLE.to_string()
        } else {
            value.to_string()
        };
        meta.items.push((key.to_string(), text));
    }

    meta.geotransform = match attributes.get("geotransform") {
        Some(GranuleAttribute::Numbers(v)) if v.len() == 6 => {
            Some([v[0], v[1], v[2], v[3], v[4], v[5]])
        }
        Some(GranuleAttribute::Numbers(v)) => {
            return Err(Error::shape("geotransform", 6, v.len()));
        }
        _ => None,
    };
    meta.projection = match attributes.get("spatial_ref") {
        Some(GranuleAttribute::Text(wkt)) if !wkt.is_empty() => Some(wkt.clone()),
        _ => None,
    };
    Ok(meta)
}

/// Embed georeferencing and the allow-listed attributes into a GeoTIFF dataset
pub fn embed_tiff_metadata(ds: &mut Dataset, meta: &OutputMetadata) -> Result<()> {
    let is_identity = |gt: [f64; 6]| gt == [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    // Projection only makes sense alongside a real geotransform
    if let Some(gt) = meta.geotransform.filter(|gt| !is_identity(*gt)) {
        ds.set_geo_transform(&gt)?;
        if let Some(projection) = meta.projection.as_deref() {
            ds.set_projection(projection)?;
        }
    }

    for (key, value) in &meta.items {
        ds.set_metadata_item(key, value, "")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granule_attributes() -> BTreeMap<String, GranuleAttribute> {
        let mut attrs = BTreeMap::new();
        for key in ALLOW_LIST {
            attrs.insert(key.to_string(), GranuleAttribute::Text(format!("{}-value", key)));
        }
        attrs.insert(
            "geotransform".to_string(),
            GranuleAttribute::Numbers(vec![-120.0, 0.0005, 0.0, 35.0, 0.0, -0.0005]),
        );
        attrs.insert("summary".to_string(), GranuleAttribute::Text("dropped".into()));
        attrs.insert("sensor".to_string(), GranuleAttribute::Text("EMIT".into()));
        attrs
    }

    #[test]
    fn test_output_metadata_is_exactly_allow_list() {
        let meta = select_output_metadata(&granule_attributes()).unwrap();
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, ALLOW_LIST.to_vec());
        assert_eq!(meta.get("title"), Some(OUTPUT_TITLE));
        assert_eq!(meta.get("flight_line"), Some("flight_line-value"));
        assert!(meta.get("summary").is_none());
        assert_eq!(
            meta.geotransform,
            Some([-120.0, 0.0005, 0.0, 35.0, 0.0, -0.0005])
        );
    }

    #[test]
    fn test_missing_allow_listed_attribute_fails() {
        let mut attrs = granule_attributes();
        attrs.remove("granule_id");
        let err = select_output_metadata(&attrs).unwrap_err();
        assert!(matches!(err, Error::MissingAttribute(ref k) if k == "granule_id"));
    }
}
