//! Ring differencing.
//!
//! Given nested buffer-unions `B(d1) ⊆ B(d2) ⊆ ... ⊆ B(dn)` (all clipped
//! to the AOI), the rings are `B(d1)`, `B(dk) - B(dk-1)`, and finally
//! `AOI - B(dn)`. Together they partition the AOI.

use deforest_rings_geometry::properties::value_as_string;
use deforest_rings_geometry::sanitize::polygonal_parts;
use deforest_rings_geometry::{FeatureSet, GeoFeature, JsonObject, Reprojector};
use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::ring::format_km;
use deforest_rings_models::{
    Aoi, Crs, DistanceSet, METERS_PER_KM, RingBounds, RingSet, RoadNetwork, SQ_METERS_PER_SQ_KM,
    Ring,
};
use geo::{Area as _, BooleanOps as _, MultiPolygon};

use crate::RingError;
use crate::chunked::buffer_union;

/// The buffer-union at one distance.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceBuffer {
    /// Distance in kilometres.
    pub dist_km: f64,
    /// Union of all road buffers at this distance, clipped to the AOI.
    pub geometry: MultiPolygon<f64>,
}

/// Everything the ring stage produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuild {
    /// One buffer-union per distance, ascending.
    pub buffers: Vec<DistanceBuffer>,
    /// The ring partition derived from `buffers`.
    pub rings: RingSet,
}

/// Buffers the network at every distance and derives the ring partition.
///
/// A distance whose buffer-union is empty (no roads near the AOI) gives
/// an empty ring; its area ends up in the outer ring, so the rings still
/// partition the AOI and every label is present.
///
/// # Errors
///
/// Returns [`RingError`] if `chunk_size` is zero.
pub fn build_rings(
    network: &RoadNetwork,
    aoi: &Aoi,
    distances: &DistanceSet,
    chunk_size: usize,
    progress: &dyn ProgressCallback,
) -> Result<RingBuild, RingError> {
    let mut buffers = Vec::with_capacity(distances.len());
    for &dist_km in distances {
        log::info!(
            "Buffering {} segments at {} km (batches of {chunk_size})",
            network.len(),
            format_km(dist_km)
        );
        let geometry = buffer_union(network, aoi, dist_km * METERS_PER_KM, chunk_size, progress)?;
        if geometry.0.is_empty() {
            log::warn!(
                "Buffer at {} km is empty (no roads?); its ring will be empty",
                format_km(dist_km)
            );
        }
        buffers.push(DistanceBuffer { dist_km, geometry });
    }

    let rings = rings_from_buffers(aoi, distances, &buffers);
    Ok(RingBuild { buffers, rings })
}

/// Derives the ring partition from ascending buffer-unions.
///
/// `buffers` must hold one entry per distance in `distances`, in order.
#[must_use]
pub fn rings_from_buffers(
    aoi: &Aoi,
    distances: &DistanceSet,
    buffers: &[DistanceBuffer],
) -> RingSet {
    debug_assert_eq!(distances.len(), buffers.len());

    let bounds = distances.ring_bounds();
    let mut rings = Vec::with_capacity(bounds.len());
    let mut previous: Option<&MultiPolygon<f64>> = None;

    for (bound, buffer) in bounds.iter().zip(buffers) {
        let geometry = previous.map_or_else(
            || buffer.geometry.clone(),
            |inner| buffer.geometry.difference(inner),
        );
        rings.push(Ring::new(*bound, geometry));
        previous = Some(&buffer.geometry);
    }

    let outer_bound = bounds[bounds.len() - 1];
    let outer = previous.map_or_else(
        || aoi.geometry.clone(),
        |inner| aoi.geometry.difference(inner),
    );
    rings.push(Ring::new(outer_bound, outer));

    RingSet::new(rings)
}

/// Area of each ring in square kilometres, in ring order.
#[must_use]
pub fn ring_areas_km2(rings: &RingSet) -> Vec<(String, f64)> {
    rings
        .rings
        .iter()
        .map(|r| {
            (
                r.ring_id.clone(),
                r.geometry.unsigned_area() / SQ_METERS_PER_SQ_KM,
            )
        })
        .collect()
}

/// Rings as features carrying `ring_id`, `min_km`, and `max_km`.
#[must_use]
pub fn ring_features(rings: &RingSet) -> Vec<GeoFeature> {
    rings
        .rings
        .iter()
        .map(|r| {
            let mut properties = JsonObject::new();
            properties.insert("ring_id".to_string(), serde_json::json!(r.ring_id));
            properties.insert("min_km".to_string(), serde_json::json!(r.bounds.min_km));
            properties.insert("max_km".to_string(), serde_json::json!(r.bounds.max_km));
            GeoFeature::new(r.geometry.clone(), properties)
        })
        .collect()
}

/// A buffer-union as a feature carrying `dist_km`.
#[must_use]
pub fn buffer_feature(buffer: &DistanceBuffer) -> GeoFeature {
    let mut properties = JsonObject::new();
    properties.insert("dist_km".to_string(), serde_json::json!(buffer.dist_km));
    GeoFeature::new(buffer.geometry.clone(), properties)
}

/// Reads a ring artifact back into a [`RingSet`] in `target`.
///
/// Rings are re-ordered by `min_km`. A ring with a null geometry is kept
/// as empty.
///
/// # Errors
///
/// Returns [`RingError::MalformedRing`] if a feature lacks `min_km`,
/// has a `ring_id` inconsistent with its bounds, or the set does not end
/// with a single open ring, and [`RingError::Geometry`] if reprojection
/// fails.
pub fn read_rings(set: &FeatureSet, target: &Crs) -> Result<RingSet, RingError> {
    let reprojector = Reprojector::new(&set.crs, target)?;
    let mut rings = Vec::with_capacity(set.len());

    for (index, feature) in set.features.iter().enumerate() {
        let min_km = feature
            .properties
            .get("min_km")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| RingError::MalformedRing {
                index,
                message: "missing numeric min_km".to_string(),
            })?;
        let max_km = feature
            .properties
            .get("max_km")
            .and_then(serde_json::Value::as_f64);
        let bounds = RingBounds { min_km, max_km };

        if let Some(label) = feature.properties.get("ring_id").and_then(value_as_string)
            && label != bounds.ring_id()
        {
            return Err(RingError::MalformedRing {
                index,
                message: format!("ring_id '{label}' does not match bounds {}", bounds.ring_id()),
            });
        }

        let mut parts = Vec::new();
        if let Some(geometry) = &feature.geometry {
            polygonal_parts(geometry, &mut parts);
        }
        let geometry = reprojector.geometry(&MultiPolygon::new(parts))?;
        rings.push(Ring::new(bounds, geometry));
    }

    rings.sort_by(|a, b| a.bounds.min_km.total_cmp(&b.bounds.min_km));

    let open = rings.iter().filter(|r| r.bounds.is_open()).count();
    let last_is_open = rings.last().is_some_and(|r| r.bounds.is_open());
    if open != 1 || !last_is_open {
        return Err(RingError::MalformedRing {
            index: rings.len().saturating_sub(1),
            message: "rings must end with exactly one open ring".to_string(),
        });
    }

    Ok(RingSet::new(rings))
}

#[cfg(test)]
mod tests {
    use deforest_rings_models::RoadSegment;
    use deforest_rings_models::progress::NullProgress;
    use geo::{Contains as _, MultiLineString, line_string, polygon};

    use super::*;

    const KM2: f64 = SQ_METERS_PER_SQ_KM;

    /// 100 km x 100 km AOI.
    fn aoi() -> Aoi {
        Aoi {
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 100_000.0, y: 0.0),
                (x: 100_000.0, y: 100_000.0),
                (x: 0.0, y: 100_000.0),
            ]]),
            crs: Crs::equal_area_default(),
        }
    }

    /// One road bisecting the AOI horizontally.
    fn bisecting_road() -> RoadNetwork {
        RoadNetwork {
            segments: vec![RoadSegment {
                class: Some("primary".to_string()),
                geometry: MultiLineString::new(vec![line_string![
                    (x: 0.0, y: 50_000.0),
                    (x: 100_000.0, y: 50_000.0),
                ]]),
            }],
            crs: Crs::equal_area_default(),
        }
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    fn build(distances: Vec<f64>, network: &RoadNetwork) -> RingBuild {
        build_rings(
            network,
            &aoi(),
            &DistanceSet::new(distances).unwrap(),
            1_000,
            &NullProgress,
        )
        .unwrap()
    }

    #[test]
    fn five_ten_twenty_scenario() {
        let build = build(vec![5.0, 10.0, 20.0], &bisecting_road());
        let areas = ring_areas_km2(&build.rings);

        let ids: Vec<&str> = areas.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["0-5km", "5-10km", "10-20km", ">20km"]);

        assert_close(areas[0].1, 1_000.0, 0.005);
        assert_close(areas[1].1, 1_000.0, 0.005);
        assert_close(areas[2].1, 2_000.0, 0.005);
        assert_close(areas[3].1, 6_000.0, 0.005);
    }

    #[test]
    fn rings_partition_the_aoi() {
        let build = build(vec![5.0, 10.0, 20.0], &bisecting_road());
        let aoi_area = aoi().geometry.unsigned_area();

        let total: f64 = build.rings.rings.iter().map(|r| r.geometry.unsigned_area()).sum();
        assert_close(total, aoi_area, 1e-6);

        for (i, a) in build.rings.rings.iter().enumerate() {
            for b in &build.rings.rings[i + 1..] {
                let overlap = a.geometry.intersection(&b.geometry).unsigned_area();
                assert!(
                    overlap / KM2 < 1e-3,
                    "{} and {} overlap by {overlap} m2",
                    a.ring_id,
                    b.ring_id
                );
            }
        }
    }

    #[test]
    fn buffers_are_monotonic() {
        let build = build(vec![5.0, 10.0, 20.0], &bisecting_road());
        for pair in build.buffers.windows(2) {
            let outside = pair[0].geometry.difference(&pair[1].geometry).unsigned_area();
            assert!(outside / KM2 < 1e-3, "{} km not inside {} km", pair[0].dist_km, pair[1].dist_km);
        }
        let probe = geo::point!(x: 50_000.0, y: 52_000.0);
        assert!(build.rings.rings[0].geometry.contains(&probe));
    }

    #[test]
    fn single_distance_gives_two_rings() {
        let build = build(vec![5.0], &bisecting_road());
        assert_eq!(build.rings.ids(), vec!["0-5km", ">5km"]);
        let areas = ring_areas_km2(&build.rings);
        assert_close(areas[0].1, 1_000.0, 0.005);
        assert_close(areas[1].1, 9_000.0, 0.005);
    }

    #[test]
    fn no_roads_puts_everything_in_the_outer_ring() {
        let empty = RoadNetwork {
            segments: Vec::new(),
            crs: Crs::equal_area_default(),
        };
        let build = build(vec![5.0, 10.0], &empty);
        assert_eq!(build.rings.len(), 3);
        assert!(build.rings.rings[0].geometry.0.is_empty());
        assert!(build.rings.rings[1].geometry.0.is_empty());
        assert_close(
            build.rings.rings[2].geometry.unsigned_area(),
            aoi().geometry.unsigned_area(),
            1e-9,
        );
    }

    #[test]
    fn ring_artifact_roundtrips_out_of_order() {
        let build = build(vec![5.0, 10.0], &bisecting_road());
        let mut features = ring_features(&build.rings);
        features.reverse();
        let set = FeatureSet {
            features,
            crs: Crs::equal_area_default(),
        };
        let rings = read_rings(&set, &Crs::equal_area_default()).unwrap();
        assert_eq!(rings.ids(), vec!["0-5km", "5-10km", ">10km"]);
        assert_eq!(rings.rings[2].bounds.max_km, None);
    }

    #[test]
    fn ring_artifact_needs_an_open_ring() {
        let build = build(vec![5.0], &bisecting_road());
        let mut features = ring_features(&build.rings);
        features.pop();
        let set = FeatureSet {
            features,
            crs: Crs::equal_area_default(),
        };
        assert!(matches!(
            read_rings(&set, &Crs::equal_area_default()),
            Err(RingError::MalformedRing { .. })
        ));
    }

    #[test]
    fn buffer_feature_has_distance() {
        let build = build(vec![5.0], &bisecting_road());
        let feature = buffer_feature(&build.buffers[0]);
        assert_eq!(feature.properties["dist_km"], serde_json::json!(5.0));
    }
}
