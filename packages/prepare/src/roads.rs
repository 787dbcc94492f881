//! Road network loading, clipping, and class filtering.

use std::collections::BTreeSet;

use deforest_rings_config::AttributeSelector;
use deforest_rings_geometry::properties::value_as_string;
use deforest_rings_geometry::{FeatureSet, GeoFeature, JsonObject, Reprojector};
use deforest_rings_models::{Aoi, Crs, RoadNetwork, RoadSegment};
use geo::{BooleanOps as _, BoundingRect as _, Geometry, Intersects as _, LineString, MultiLineString};

use crate::PrepareError;

fn line_parts(geometry: &Geometry<f64>, out: &mut Vec<LineString<f64>>) {
    match geometry {
        Geometry::Line(l) => out.push(LineString::from(vec![l.start, l.end])),
        Geometry::LineString(ls) => out.push(ls.clone()),
        Geometry::MultiLineString(mls) => out.extend(mls.0.iter().cloned()),
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                line_parts(g, out);
            }
        }
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => {}
    }
}

/// Reads road segments (in the dataset's CRS) from a feature set.
///
/// The class attribute is optional: when the dataset lacks it, every
/// segment is unclassified.
#[must_use]
pub fn load_roads(set: &FeatureSet, class_attribute: &AttributeSelector) -> Vec<RoadSegment> {
    let keys = set.property_keys();
    let column = class_attribute.find(keys.iter().copied());
    if column.is_none() && !set.is_empty() {
        log::warn!(
            "roads: no '{}' attribute, segments are unclassified",
            class_attribute.name
        );
    }

    let mut skipped = 0_usize;
    let mut segments = Vec::with_capacity(set.len());
    for feature in &set.features {
        let mut lines = Vec::new();
        if let Some(geometry) = &feature.geometry {
            line_parts(geometry, &mut lines);
        }
        lines.retain(|l| l.0.len() >= 2);
        if lines.is_empty() {
            skipped += 1;
            continue;
        }

        segments.push(RoadSegment {
            class: column
                .as_deref()
                .and_then(|c| feature.properties.get(c))
                .and_then(value_as_string),
            geometry: MultiLineString::new(lines),
        });
    }

    if skipped > 0 {
        log::warn!("roads: skipped {skipped} features without line geometry");
    }

    segments
}

/// Reprojects segments into `target` without clipping.
///
/// # Errors
///
/// Returns [`PrepareError::Geometry`] if reprojection fails.
pub fn project_roads(
    segments: Vec<RoadSegment>,
    source: &Crs,
    target: &Crs,
) -> Result<RoadNetwork, PrepareError> {
    let reprojector = Reprojector::new(source, target)?;
    let segments = segments
        .into_iter()
        .map(|s| {
            Ok(RoadSegment {
                geometry: reprojector.geometry(&s.geometry)?,
                class: s.class,
            })
        })
        .collect::<Result<Vec<_>, PrepareError>>()?;

    Ok(RoadNetwork {
        segments,
        crs: target.clone(),
    })
}

/// Reprojects segments into the AOI's CRS and clips them to the AOI.
///
/// Segments entirely outside the AOI are dropped; segments crossing its
/// edge keep only the inside parts.
///
/// # Errors
///
/// Returns [`PrepareError::Geometry`] if reprojection fails.
pub fn clip_roads(
    segments: Vec<RoadSegment>,
    source: &Crs,
    aoi: &Aoi,
) -> Result<RoadNetwork, PrepareError> {
    let total = segments.len();
    let projected = project_roads(segments, source, &aoi.crs)?;
    let Some(aoi_rect) = aoi.geometry.bounding_rect() else {
        log::warn!("AOI is empty, no roads kept");
        return Ok(RoadNetwork {
            segments: Vec::new(),
            crs: aoi.crs.clone(),
        });
    };

    let mut kept = Vec::new();
    for segment in projected.segments {
        let inside = segment
            .geometry
            .bounding_rect()
            .is_some_and(|r| r.intersects(&aoi_rect));
        if !inside {
            continue;
        }

        let mut clipped = aoi.geometry.clip(&segment.geometry, false);
        clipped.0.retain(|l| l.0.len() >= 2);
        if !clipped.0.is_empty() {
            kept.push(RoadSegment {
                class: segment.class,
                geometry: clipped,
            });
        }
    }

    log::info!("Roads: {}/{total} segments inside the AOI", kept.len());
    if kept.is_empty() {
        log::warn!("No road segments intersect the AOI");
    }

    Ok(RoadNetwork {
        segments: kept,
        crs: aoi.crs.clone(),
    })
}

/// Keeps segments whose class is one of `classes` (case-insensitive).
///
/// An empty `classes` list keeps everything. When no segment carries a
/// class the filter is skipped with a warning.
///
/// # Errors
///
/// Returns [`PrepareError::NoRoadsAfterFilter`] if the filter removes
/// every segment.
pub fn filter_road_classes(
    mut network: RoadNetwork,
    classes: &[String],
) -> Result<RoadNetwork, PrepareError> {
    if classes.is_empty() {
        return Ok(network);
    }
    if network.segments.iter().all(|s| s.class.is_none()) {
        log::warn!("Roads carry no class attribute, ignoring road class filter");
        return Ok(network);
    }

    let keep: BTreeSet<String> = classes.iter().map(|c| c.trim().to_lowercase()).collect();
    let before = network.len();
    network.segments.retain(|s| {
        s.class
            .as_deref()
            .is_some_and(|c| keep.contains(&c.trim().to_lowercase()))
    });
    log::info!(
        "Road class filter {:?}: {}/{before} segments",
        keep,
        network.len()
    );

    if network.is_empty() {
        return Err(PrepareError::NoRoadsAfterFilter {
            classes: keep.into_iter().collect(),
            before,
        });
    }
    Ok(network)
}

/// Road segments as features, with the class written under `class_key`.
#[must_use]
pub fn road_features(network: &RoadNetwork, class_key: &str) -> Vec<GeoFeature> {
    network
        .segments
        .iter()
        .map(|s| {
            let mut properties = JsonObject::new();
            properties.insert(
                class_key.to_string(),
                s.class
                    .as_ref()
                    .map_or(serde_json::Value::Null, |c| serde_json::json!(c)),
            );
            GeoFeature::new(s.geometry.clone(), properties)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, line_string, polygon};
    use serde_json::json;

    use super::*;

    fn road(class: Option<&str>, line: LineString<f64>) -> GeoFeature {
        let mut props = JsonObject::new();
        if let Some(c) = class {
            props.insert("fclass".to_string(), json!(c));
        }
        GeoFeature::new(line, props)
    }

    fn aoi() -> Aoi {
        Aoi {
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ]]),
            crs: Crs::wgs84(),
        }
    }

    fn network(classes: &[Option<&str>]) -> RoadNetwork {
        RoadNetwork {
            segments: classes
                .iter()
                .map(|c| RoadSegment {
                    class: c.map(str::to_string),
                    geometry: MultiLineString::new(vec![line_string![
                        (x: 0.0, y: 0.0),
                        (x: 1.0, y: 1.0)
                    ]]),
                })
                .collect(),
            crs: Crs::wgs84(),
        }
    }

    #[test]
    fn loads_classes_and_skips_non_lines() {
        let set = FeatureSet {
            features: vec![
                road(Some("primary"), line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)]),
                GeoFeature::new(geo::point!(x: 1.0, y: 1.0), JsonObject::new()),
            ],
            crs: Crs::wgs84(),
        };
        let segments = load_roads(&set, &AttributeSelector::named("FCLASS"));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].class.as_deref(), Some("primary"));
    }

    #[test]
    fn clip_keeps_inside_parts_only() {
        let set = FeatureSet {
            features: vec![
                road(Some("primary"), line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)]),
                road(Some("track"), line_string![(x: 20.0, y: 20.0), (x: 30.0, y: 30.0)]),
            ],
            crs: Crs::wgs84(),
        };
        let segments = load_roads(&set, &AttributeSelector::named("fclass"));
        let clipped = clip_roads(segments, &set.crs, &aoi()).unwrap();

        assert_eq!(clipped.len(), 1);
        let line = &clipped.segments[0].geometry.0[0];
        let xs: Vec<f64> = line.coords().map(|c| c.x).collect();
        let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min.abs() < 1e-9 && (max - 10.0).abs() < 1e-9, "{xs:?}");
    }

    #[test]
    fn class_filter_is_case_insensitive() {
        let net = network(&[Some("Primary"), Some("track"), Some("secondary")]);
        let filtered =
            filter_road_classes(net, &["PRIMARY".to_string(), "secondary".to_string()]).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn class_filter_removing_everything_is_fatal() {
        let net = network(&[Some("track")]);
        let err = filter_road_classes(net, &["motorway".to_string()]).unwrap_err();
        assert!(matches!(err, PrepareError::NoRoadsAfterFilter { before: 1, .. }));
    }

    #[test]
    fn class_filter_without_classes_is_ignored() {
        let net = network(&[None, None]);
        let filtered = filter_road_classes(net, &["primary".to_string()]).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn features_carry_class_key() {
        let features = road_features(&network(&[Some("primary"), None]), "fclass");
        assert_eq!(features[0].properties["fclass"], json!("primary"));
        assert!(features[1].properties["fclass"].is_null());
    }
}
