//! `GeoJSON` feature collection reading and writing.
//!
//! Inputs may declare their CRS with the legacy (RFC 7946-deprecated)
//! `crs` member. Projected artifacts written by the pipeline carry the
//! same member so later stages know which CRS they are in: a `name`
//! member with an OGC URN for EPSG codes, or a `proj4` member for raw
//! definitions.

use std::collections::BTreeSet;
use std::path::Path;

use deforest_rings_models::Crs;
use geojson::{Feature, FeatureCollection, GeoJson};

use crate::GeometryError;

/// `GeoJSON` property map.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// One feature: attributes plus an optional geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    /// Attribute values.
    pub properties: JsonObject,
    /// Geometry; `None` for null geometries.
    pub geometry: Option<geo::Geometry<f64>>,
}

impl GeoFeature {
    /// Builds a feature from a geometry and properties.
    #[must_use]
    pub fn new(geometry: impl Into<geo::Geometry<f64>>, properties: JsonObject) -> Self {
        Self {
            properties,
            geometry: Some(geometry.into()),
        }
    }
}

/// A loaded feature collection with its resolved CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// Features in file order.
    pub features: Vec<GeoFeature>,
    /// CRS declared by the file, or the fallback CRS.
    pub crs: Crs,
}

impl FeatureSet {
    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the set has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Sorted union of every property key present in the set.
    #[must_use]
    pub fn property_keys(&self) -> Vec<&str> {
        let keys: BTreeSet<&str> = self
            .features
            .iter()
            .flat_map(|f| f.properties.keys().map(String::as_str))
            .collect();
        keys.into_iter().collect()
    }
}

/// Reads the CRS out of a legacy `crs` foreign member.
fn crs_from_member(member: &serde_json::Value) -> Option<Crs> {
    let props = member.get("properties")?;
    match member.get("type").and_then(serde_json::Value::as_str) {
        Some("proj4") => props
            .get("proj4")
            .and_then(serde_json::Value::as_str)
            .map(|def| Crs::Proj(def.to_string())),
        _ => props
            .get("name")
            .and_then(serde_json::Value::as_str)
            .and_then(|name| name.parse().ok()),
    }
}

fn crs_member(crs: &Crs) -> serde_json::Value {
    crs.urn().map_or_else(
        || {
            serde_json::json!({
                "type": "proj4",
                "properties": { "proj4": crs.to_string() },
            })
        },
        |urn| {
            serde_json::json!({
                "type": "name",
                "properties": { "name": urn },
            })
        },
    )
}

fn convert_feature(feature: Feature) -> Result<GeoFeature, GeometryError> {
    let geometry = match feature.geometry {
        Some(g) => Some(geo::Geometry::<f64>::try_from(g)?),
        None => None,
    };
    Ok(GeoFeature {
        properties: feature.properties.unwrap_or_default(),
        geometry,
    })
}

/// Reads a `GeoJSON` file into a [`FeatureSet`].
///
/// A bare `Feature` or `Geometry` document is accepted as a one-feature
/// collection. When the file declares no CRS, `default_crs` is assumed
/// and a warning is logged.
///
/// # Errors
///
/// Returns [`GeometryError::MissingInput`] if `path` does not exist, or
/// another [`GeometryError`] if it cannot be read or parsed.
pub fn read_features(
    path: &Path,
    label: &str,
    default_crs: &Crs,
) -> Result<FeatureSet, GeometryError> {
    if !path.exists() {
        return Err(GeometryError::MissingInput {
            label: label.to_string(),
            path: path.to_path_buf(),
        });
    }

    log::info!("Reading {label}: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| GeometryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (features, declared) = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => {
            let declared = fc
                .foreign_members
                .as_ref()
                .and_then(|m| m.get("crs"))
                .and_then(crs_from_member);
            let features = fc
                .features
                .into_iter()
                .map(convert_feature)
                .collect::<Result<Vec<_>, _>>()?;
            (features, declared)
        }
        GeoJson::Feature(f) => (vec![convert_feature(f)?], None),
        GeoJson::Geometry(g) => (
            vec![GeoFeature {
                properties: JsonObject::new(),
                geometry: Some(geo::Geometry::<f64>::try_from(g)?),
            }],
            None,
        ),
    };

    let crs = declared.unwrap_or_else(|| {
        log::warn!("{label} has no CRS, assuming {default_crs}");
        default_crs.clone()
    });

    log::debug!("{label}: {} features in {crs}", features.len());

    Ok(FeatureSet { features, crs })
}

/// Writes features as a `GeoJSON` feature collection tagged with `crs`.
///
/// Parent directories are created as needed. Returns the number of
/// features written.
///
/// # Errors
///
/// Returns [`GeometryError`] if serialization or the write fails.
pub fn write_features<I>(path: &Path, features: I, crs: &Crs) -> Result<usize, GeometryError>
where
    I: IntoIterator<Item = GeoFeature>,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| GeometryError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let features: Vec<Feature> = features
        .into_iter()
        .map(|f| Feature {
            bbox: None,
            geometry: f
                .geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: None,
            properties: Some(f.properties),
            foreign_members: None,
        })
        .collect();
    let count = features.len();

    let mut foreign_members = JsonObject::new();
    foreign_members.insert("crs".to_string(), crs_member(crs));

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    };

    let json = serde_json::to_string(&collection)?;
    std::fs::write(path, json).map_err(|source| GeometryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("Wrote {count} features to {}", path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("deforest_rings_io_{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn roundtrips_features_and_projected_crs() {
        let path = temp_path("roundtrip.geojson");
        let mut props = JsonObject::new();
        props.insert("ring_id".to_string(), serde_json::json!("0-5km"));
        let square = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]]);

        let crs = Crs::equal_area_default();
        let written =
            write_features(&path, vec![GeoFeature::new(square.clone(), props)], &crs).unwrap();
        assert_eq!(written, 1);

        let set = read_features(&path, "rings", &Crs::wgs84()).unwrap();
        assert_eq!(set.crs, crs);
        assert_eq!(set.len(), 1);
        assert_eq!(set.property_keys(), vec!["ring_id"]);
        assert_eq!(
            set.features[0].geometry,
            Some(geo::Geometry::MultiPolygon(square))
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn epsg_crs_member_roundtrips() {
        let path = temp_path("epsg.geojson");
        write_features(&path, Vec::new(), &Crs::Epsg(5880)).unwrap();
        let set = read_features(&path, "empty", &Crs::wgs84()).unwrap();
        assert_eq!(set.crs, Crs::Epsg(5880));
        assert!(set.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_crs_falls_back_to_default() {
        let path = temp_path("nocrs.geojson");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"fclass":"primary"},
                 "geometry":{"type":"LineString","coordinates":[[-60.0,2.0],[-61.0,3.0]]}}
            ]}"#,
        )
        .unwrap();

        let set = read_features(&path, "roads", &Crs::wgs84()).unwrap();
        assert_eq!(set.crs, Crs::wgs84());
        assert!(matches!(
            set.features[0].geometry,
            Some(geo::Geometry::LineString(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_features(Path::new("/no/such/roads.geojson"), "roads", &Crs::wgs84())
            .unwrap_err();
        assert!(matches!(err, GeometryError::MissingInput { .. }));
        assert!(err.to_string().contains("/no/such/roads.geojson"));
    }
}
