//! CMR UMM-G granule records: spatial footprint, asset links and browse imagery.
//!
//! Records are accepted as returned by search tools, either wrapped
//! (`{"umm": {...}, "meta": {...}}`) or as a bare UMM object. A JSON array, or a
//! CMR search response with an `items` array, loads as a list.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use tracing::warn;

use crate::error::{Error, Result};
use crate::geometry::Polygon;
use crate::types::AssetScheme;

pub mod matching;
pub use matching::{Timestamped, concurrent_match};

pub const DATA_LINK_TYPE: &str = "GET DATA";
pub const DIRECT_ACCESS_LINK_TYPE: &str = "GET DATA VIA DIRECT ACCESS";
pub const BROWSE_LINK_TYPE: &str = "GET RELATED VISUALIZATION";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Umm {
    #[serde(rename = "GranuleUR")]
    pub granule_ur: String,
    #[serde(default)]
    pub spatial_extent: Option<SpatialExtent>,
    #[serde(default)]
    pub temporal_extent: Option<TemporalExtent>,
    #[serde(default)]
    pub related_urls: Vec<RelatedUrl>,
    #[serde(default)]
    pub collection_reference: Option<CollectionReference>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpatialExtent {
    pub horizontal_spatial_domain: Option<HorizontalSpatialDomain>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HorizontalSpatialDomain {
    pub geometry: UmmGeometry,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UmmGeometry {
    #[serde(default)]
    pub bounding_rectangles: Option<Vec<BoundingRectangle>>,
    #[serde(default)]
    pub g_polygons: Option<Vec<GPolygon>>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingRectangle {
    pub west_bounding_coordinate: f64,
    pub south_bounding_coordinate: f64,
    pub east_bounding_coordinate: f64,
    pub north_bounding_coordinate: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GPolygon {
    pub boundary: Boundary,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Boundary {
    pub points: Vec<UmmPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UmmPoint {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemporalExtent {
    #[serde(default)]
    pub range_date_time: Option<RangeDateTime>,
    #[serde(default)]
    pub single_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RangeDateTime {
    pub beginning_date_time: DateTime<Utc>,
    #[serde(default)]
    pub ending_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelatedUrl {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CollectionReference {
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One search result
#[derive(Debug, Clone, Serialize)]
pub struct Granule {
    pub umm: Umm,
    pub meta: Option<Value>,
}

impl Granule {
    pub fn from_value(mut value: Value) -> Result<Self> {
        let meta = value.get_mut("meta").map(Value::take);
        let umm = match value.get_mut("umm") {
            Some(umm) => umm.take(),
            None => value,
        };
        Ok(Self {
            umm: serde_json::from_value(umm)?,
            meta,
        })
    }

    pub fn id(&self) -> &str {
        &self.umm.granule_ur
    }

    pub fn short_name(&self) -> Option<&str> {
        self.umm
            .collection_reference
            .as_ref()
            .and_then(|c| c.short_name.as_deref())
    }

    /// Acquisition start (range beginning, else the single date time)
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        let temporal = self.umm.temporal_extent.as_ref()?;
        temporal
            .range_date_time
            .as_ref()
            .map(|r| r.beginning_date_time)
            .or(temporal.single_date_time)
    }

    fn geometry(&self) -> Option<&UmmGeometry> {
        self.umm
            .spatial_extent
            .as_ref()?
            .horizontal_spatial_domain
            .as_ref()
            .map(|h| &h.geometry)
    }

    /// Links of the given `Type`
    pub fn links_of_type(&self, kind: &str) -> Vec<&str> {
        self.umm
            .related_urls
            .iter()
            .filter(|u| u.kind.as_deref() == Some(kind))
            .map(|u| u.url.as_str())
            .collect()
    }

    /// Downloadable data links for the scheme
    pub fn data_links(&self, scheme: AssetScheme) -> Vec<&str> {
        let kind = match scheme {
            AssetScheme::Https => DATA_LINK_TYPE,
            AssetScheme::S3 => DIRECT_ACCESS_LINK_TYPE,
        };
        self.links_of_type(kind)
            .into_iter()
            .filter(|u| u.starts_with(scheme.prefix()))
            .collect()
    }
}

/// Parse one granule, an array of granules, or a CMR `items` response
pub fn parse_granules(value: Value) -> Result<Vec<Granule>> {
    match value {
        Value::Array(items) => items.into_iter().map(Granule::from_value).collect(),
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items.into_iter().map(Granule::from_value).collect(),
            _ => Ok(vec![Granule::from_value(Value::Object(obj))?]),
        },
        other => Err(Error::InvalidArgument {
            arg: "granules",
            value: other.to_string(),
        }),
    }
}

pub fn load_granules<P: AsRef<Path>>(path: P) -> Result<Vec<Granule>> {
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let value: Value = serde_json::from_reader(reader)?;
    parse_granules(value)
}

/// Spatial footprint: the first bounding rectangle as a counter-clockwise box, else
/// the first GPolygon boundary in (lon, lat).
pub fn granule_geometry(granule: &Granule) -> Result<Polygon> {
    let geometry = granule.geometry().cloned().unwrap_or_default();
    if let Some(br) = geometry.bounding_rectangles.as_ref().and_then(|v| v.first()) {
        return Ok(Polygon::from_bounds(
            br.west_bounding_coordinate,
            br.south_bounding_coordinate,
            br.east_bounding_coordinate,
            br.north_bounding_coordinate,
        ));
    }
    if let Some(gp) = geometry.g_polygons.as_ref().and_then(|v| v.first()) {
        let points = gp
            .boundary
            .points
            .iter()
            .map(|p| (p.longitude, p.latitude))
            .collect();
        return Polygon::new(points);
    }
    Err(Error::UnsupportedGeometry(granule.id().to_string()))
}

/// Footprint vertices as a list of pairs; `(lat, lon)` when `lat_lon`, else `(lon, lat)`.
///
/// GPolygon points are returned as stored. A bounding rectangle yields the closed
/// ring NW, SW, SE, NE, NW.
pub fn granule_vertices(granule: &Granule, lat_lon: bool) -> Result<Vec<(f64, f64)>> {
    let geometry = granule.geometry().cloned().unwrap_or_default();
    let coords: Vec<(f64, f64)> = if let Some(gp) = geometry.g_polygons.as_ref().and_then(|v| v.first()) {
        gp.boundary
            .points
            .iter()
            .map(|p| (p.longitude, p.latitude))
            .collect()
    } else if let Some(br) = geometry.bounding_rectangles.as_ref().and_then(|v| v.first()) {
        let (west, south) = (br.west_bounding_coordinate, br.south_bounding_coordinate);
        let (east, north) = (br.east_bounding_coordinate, br.north_bounding_coordinate);
        vec![
            (west, north),
            (west, south),
            (east, south),
            (east, north),
            (west, north),
        ]
    } else {
        return Err(Error::UnsupportedGeometry(granule.id().to_string()));
    };

    if lat_lon {
        Ok(coords.into_iter().map(|(lon, lat)| (lat, lon)).collect())
    } else {
        Ok(coords)
    }
}

/// Criteria for [`asset_urls`]. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    /// Any of these substrings must appear in the URL
    pub contains: Vec<String>,
    /// Any of these extensions must appear in the URL
    pub extensions: Vec<String>,
    pub first_only: bool,
    pub scheme: Option<AssetScheme>,
}

impl AssetFilter {
    fn scheme(&self) -> AssetScheme {
        self.scheme.unwrap_or(AssetScheme::Https)
    }

    fn matches(&self, url: &str) -> bool {
        url.starts_with(self.scheme().prefix())
            && (self.extensions.is_empty() || self.extensions.iter().any(|e| url.contains(e.as_str())))
            && (self.contains.is_empty() || self.contains.iter().any(|c| url.contains(c.as_str())))
    }

    fn describe(&self) -> String {
        let mut criteria = vec![format!("startswith={:?}", self.scheme().prefix())];
        if !self.extensions.is_empty() {
            criteria.push(format!("extension={:?}", self.extensions));
        }
        if !self.contains.is_empty() {
            criteria.push(format!("contains={:?}", self.contains));
        }
        criteria.join(", ")
    }
}

/// Related URLs matching every criterion of `filter`, in record order
pub fn asset_urls(granule: &Granule, filter: &AssetFilter) -> Result<Vec<String>> {
    let mut matched: Vec<String> = granule
        .umm
        .related_urls
        .iter()
        .map(|u| u.url.as_str())
        .filter(|u| filter.matches(u))
        .map(str::to_string)
        .collect();
    if matched.is_empty() {
        return Err(Error::NoMatchingAssets(filter.describe()));
    }
    if filter.first_only {
        matched.truncate(1);
    }
    Ok(matched)
}

/// Browse image link: the only https one, else the first `.png`, else the first
pub fn browse_image(granule: &Granule) -> Option<String> {
    let links: Vec<&str> = granule
        .links_of_type(BROWSE_LINK_TYPE)
        .into_iter()
        .filter(|l| l.contains("https"))
        .collect();
    match links.as_slice() {
        [] => {
            warn!("There is no browse imagery for {}", granule.id());
            None
        }
        [only] => Some(only.to_string()),
        many => many
            .iter()
            .find(|l| l.contains(".png"))
            .or_else(|| many.first())
            .map(|l| l.to_string()),
    }
}

/// Flattened search result row
#[derive(Debug, Clone, Serialize)]
pub struct GranuleSummary {
    pub granule_ur: String,
    pub short_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub geometry: Polygon,
    pub browse: Option<String>,
    pub data: Vec<String>,
}

pub fn results_summary(granules: &[Granule]) -> Result<Vec<GranuleSummary>> {
    granules
        .iter()
        .map(|g| {
            Ok(GranuleSummary {
                granule_ur: g.id().to_string(),
                short_name: g.short_name().map(str::to_string),
                start_time: g.start_time(),
                geometry: granule_geometry(g)?,
                browse: browse_image(g),
                data: g
                    .data_links(AssetScheme::Https)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect()
}

/// GeoJSON FeatureCollection (EPSG:4326) of summary rows
pub fn summaries_to_geojson(summaries: &[GranuleSummary]) -> Value {
    let features: Vec<Value> = summaries
        .iter()
        .map(|s| {
            json!({
                "type": "Feature",
                "geometry": s.geometry.to_geojson(),
                "properties": {
                    "granule_ur": s.granule_ur,
                    "shortname": s.short_name,
                    "start_time": s.start_time.map(|t| t.to_rfc3339()),
                    "browse": s.browse,
                    "data": s.data,
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rectangle_granule() -> Granule {
        Granule::from_value(json!({
            "meta": { "concept-id": "G1" },
            "umm": {
                "GranuleUR": "EMIT_L2A_RFL_001_20230401T181052_2309112_006",
                "CollectionReference": { "ShortName": "EMITL2ARFL", "Version": "001" },
                "TemporalExtent": { "RangeDateTime": {
                    "BeginningDateTime": "2023-04-01T18:10:52Z",
                    "EndingDateTime": "2023-04-01T18:11:04Z" } },
                "SpatialExtent": { "HorizontalSpatialDomain": { "Geometry": {
                    "BoundingRectangles": [{
                        "WestBoundingCoordinate": -120.5,
                        "SouthBoundingCoordinate": 34.2,
                        "EastBoundingCoordinate": -119.8,
                        "NorthBoundingCoordinate": 34.9 }] } } },
                "RelatedUrls": [
                    { "URL": "https://data.example/EMIT_L2A_RFL_001.nc", "Type": "GET DATA" },
                    { "URL": "https://data.example/EMIT_L2A_RFLUNCERT_001.nc", "Type": "GET DATA" },
                    { "URL": "https://data.example/EMIT_L2A_MASK_001.nc", "Type": "GET DATA" },
                    { "URL": "s3://bucket/EMIT_L2A_RFL_001.nc", "Type": "GET DATA VIA DIRECT ACCESS" },
                    { "URL": "https://data.example/EMIT_L2A_RFL_001.png", "Type": "GET RELATED VISUALIZATION" },
                    { "URL": "https://data.example/EMIT_L2A_RFL_001.jpg", "Type": "GET RELATED VISUALIZATION" }
                ]
            }
        }))
        .unwrap()
    }

    fn polygon_granule() -> Granule {
        Granule::from_value(json!({
            "GranuleUR": "PACE_OCI_20240501",
            "TemporalExtent": { "SingleDateTime": "2024-05-01T12:00:00Z" },
            "SpatialExtent": { "HorizontalSpatialDomain": { "Geometry": {
                "GPolygons": [{ "Boundary": { "Points": [
                    { "Longitude": 10.0, "Latitude": 1.0 },
                    { "Longitude": 11.0, "Latitude": 1.0 },
                    { "Longitude": 11.0, "Latitude": 2.0 },
                    { "Longitude": 10.0, "Latitude": 1.0 }
                ] } }] } } },
            "RelatedUrls": [
                { "URL": "https://data.example/PACE.jpg", "Type": "GET RELATED VISUALIZATION" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_rectangle_geometry_is_ccw_box() {
        let g = granule_geometry(&rectangle_granule()).unwrap();
        assert_eq!(g.exterior.len(), 5);
        assert!(g.signed_area() > 0.0);
        assert_eq!(g.bounds(), (-120.5, 34.2, -119.8, 34.9));
    }

    #[test]
    fn test_polygon_geometry_and_vertices() {
        let granule = polygon_granule();
        let g = granule_geometry(&granule).unwrap();
        assert_eq!(g.exterior[1], (11.0, 1.0));
        let v = granule_vertices(&granule, true).unwrap();
        assert_eq!(v[1], (1.0, 11.0));
        assert_eq!(granule.start_time().unwrap().to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_rectangle_vertices_ring_order() {
        let v = granule_vertices(&rectangle_granule(), false).unwrap();
        assert_eq!(
            v,
            vec![
                (-120.5, 34.9),
                (-120.5, 34.2),
                (-119.8, 34.2),
                (-119.8, 34.9),
                (-120.5, 34.9)
            ]
        );
    }

    #[test]
    fn test_missing_geometry_is_error() {
        let granule = Granule::from_value(json!({ "GranuleUR": "X" })).unwrap();
        assert!(matches!(granule_geometry(&granule), Err(Error::UnsupportedGeometry(_))));
        assert!(granule_vertices(&granule, true).is_err());
    }

    #[test]
    fn test_asset_filter() {
        let granule = rectangle_granule();
        let filter = AssetFilter {
            contains: vec!["RFL_".into(), "MASK".into()],
            extensions: vec![".nc".into()],
            ..AssetFilter::default()
        };
        let urls = asset_urls(&granule, &filter).unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("EMIT_L2A_RFL_001.nc"));

        let s3 = AssetFilter {
            scheme: Some(AssetScheme::S3),
            first_only: true,
            ..AssetFilter::default()
        };
        assert_eq!(asset_urls(&granule, &s3).unwrap(), vec!["s3://bucket/EMIT_L2A_RFL_001.nc"]);

        let none = AssetFilter {
            contains: vec!["LST".into()],
            ..AssetFilter::default()
        };
        let err = asset_urls(&granule, &none).unwrap_err();
        assert!(err.to_string().contains("contains"));
    }

    #[test]
    fn test_browse_image_selection() {
        assert_eq!(
            browse_image(&rectangle_granule()).as_deref(),
            Some("https://data.example/EMIT_L2A_RFL_001.png")
        );
        assert_eq!(
            browse_image(&polygon_granule()).as_deref(),
            Some("https://data.example/PACE.jpg")
        );
        let bare = Granule::from_value(json!({ "GranuleUR": "X" })).unwrap();
        assert!(browse_image(&bare).is_none());
    }

    #[test]
    fn test_parse_cmr_items_and_summary() {
        let value = json!({ "items": [
            serde_json::to_value(&rectangle_granule()).unwrap(),
        ] });
        let granules = parse_granules(value).unwrap();
        assert_eq!(granules.len(), 1);

        let summary = results_summary(&granules).unwrap();
        assert_eq!(summary[0].short_name.as_deref(), Some("EMITL2ARFL"));
        assert_eq!(summary[0].data.len(), 3);
        let fc = summaries_to_geojson(&summary);
        assert_eq!(fc["features"][0]["geometry"]["type"], "Polygon");
    }
}
