//! Deforestation x ring intersection with a fallback chain.
//!
//! The primary strategy indexes the rings in an R-tree and intersects
//! each feature with only the rings whose envelope it touches. It
//! requires every input polygon to be valid. When that does not hold the
//! fallback clips every feature against each ring in turn, repairing
//! features first; it requires only finite coordinates. Both produce
//! pieces ordered by (feature, ring), so for valid input the results are
//! identical.

use deforest_rings_geometry::sanitize::{SanitizeStats, has_finite_coords, sanitize_geometry};
use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::{DeforestationFeature, IntersectionFeature, RingSet, SQ_METERS_PER_HECTARE};
use deforest_rings_spatial::PolygonIndex;
use geo::{Area as _, BooleanOps as _, BoundingRect as _, Geometry, Intersects as _, MultiPolygon, Validation as _};

use crate::OverlayError;

/// Which strategy produced an overlay result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// R-tree candidate search with direct intersection.
    Primary,
    /// Per-ring clip loop over repaired features.
    Fallback,
}

/// Result of [`intersect_rings`].
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayOutcome {
    /// The primary strategy succeeded.
    Primary(Vec<IntersectionFeature>),
    /// The primary strategy failed and the fallback succeeded.
    Fallback {
        /// Intersection pieces.
        features: Vec<IntersectionFeature>,
        /// Why the primary strategy was abandoned.
        reason: String,
    },
}

impl OverlayOutcome {
    /// The strategy that produced the result.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        match self {
            Self::Primary(_) => Strategy::Primary,
            Self::Fallback { .. } => Strategy::Fallback,
        }
    }

    /// The intersection pieces.
    #[must_use]
    pub fn features(&self) -> &[IntersectionFeature] {
        match self {
            Self::Primary(features) | Self::Fallback { features, .. } => features,
        }
    }

    /// Consumes the outcome, returning the pieces.
    #[must_use]
    pub fn into_features(self) -> Vec<IntersectionFeature> {
        match self {
            Self::Primary(features) | Self::Fallback { features, .. } => features,
        }
    }
}

/// Area of a planar geometry in hectares.
#[must_use]
pub fn area_ha(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.unsigned_area() / SQ_METERS_PER_HECTARE
}

/// Drops features whose bounding box misses the rings' combined extent.
///
/// Only features that cannot intersect any ring are removed, so the
/// overlay result is unchanged.
#[must_use]
pub fn prefilter_envelope(
    features: Vec<DeforestationFeature>,
    rings: &RingSet,
) -> Vec<DeforestationFeature> {
    let extent = ring_index(rings).extent();

    let before = features.len();
    let kept: Vec<DeforestationFeature> = match extent {
        Some(extent) => features
            .into_iter()
            .filter(|f| {
                f.geometry
                    .bounding_rect()
                    .is_some_and(|r| r.intersects(&extent))
            })
            .collect(),
        None => Vec::new(),
    };

    log::info!("Envelope pre-filter: {}/{before} features", kept.len());
    kept
}

/// Repairs features and explodes them into one feature per polygon.
///
/// Non-polygonal fragments, non-finite polygons, and empty pieces are
/// dropped.
#[must_use]
pub fn sanitize_features(
    features: &[DeforestationFeature],
) -> (Vec<DeforestationFeature>, SanitizeStats) {
    let mut stats = SanitizeStats::default();
    let mut out = Vec::with_capacity(features.len());

    for feature in features {
        let (polygons, s) = sanitize_geometry(&Geometry::MultiPolygon(feature.geometry.clone()));
        stats.merge(s);
        out.extend(polygons.into_iter().map(|p| DeforestationFeature {
            year: feature.year,
            class: feature.class.clone(),
            geometry: MultiPolygon::new(vec![p]),
        }));
    }

    (out, stats)
}

/// R-tree over the rings, keyed by ring id.
fn ring_index(rings: &RingSet) -> PolygonIndex<&str> {
    PolygonIndex::new(
        rings
            .rings
            .iter()
            .map(|r| (r.ring_id.as_str(), r.geometry.clone())),
    )
}

fn piece(
    ring_id: &str,
    feature: &DeforestationFeature,
    ring: &MultiPolygon<f64>,
) -> Option<IntersectionFeature> {
    let geometry = ring.intersection(&feature.geometry);
    let area_ha = area_ha(&geometry);
    (area_ha > 0.0).then(|| IntersectionFeature {
        ring_id: ring_id.to_string(),
        year: feature.year,
        area_ha,
        geometry,
    })
}

/// Primary strategy.
///
/// Precondition: every feature and ring polygon is valid.
/// Postcondition: pieces ordered by (feature index, ring index), each with
/// positive area.
///
/// # Errors
///
/// Returns [`OverlayError::InvalidGeometry`] naming the first invalid
/// input.
pub fn intersect_primary(
    features: &[DeforestationFeature],
    rings: &RingSet,
    progress: &dyn ProgressCallback,
) -> Result<Vec<IntersectionFeature>, OverlayError> {
    for ring in &rings.rings {
        if !ring.geometry.is_valid() {
            return Err(OverlayError::InvalidGeometry {
                what: format!("ring {}", ring.ring_id),
            });
        }
    }
    for (index, feature) in features.iter().enumerate() {
        if !feature.geometry.is_valid() {
            return Err(OverlayError::InvalidGeometry {
                what: format!("deforestation feature {index} ({})", feature.year),
            });
        }
    }

    let index = ring_index(rings);

    progress.set_total(features.len() as u64);
    progress.set_position(0);
    progress.set_message("intersecting".to_string());

    let mut out = Vec::new();
    for feature in features {
        for candidate in index.candidates_for(&feature.geometry) {
            if let Some(p) = piece(candidate.value, feature, candidate.polygon) {
                out.push(p);
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(out)
}

/// Fallback strategy.
///
/// Precondition: every feature coordinate is finite.
/// Postcondition: same as [`intersect_primary`], computed from repaired
/// features.
///
/// # Errors
///
/// Returns [`OverlayError::NonFiniteGeometry`] naming the first feature
/// with a non-finite coordinate.
pub fn intersect_fallback(
    features: &[DeforestationFeature],
    rings: &RingSet,
    progress: &dyn ProgressCallback,
) -> Result<Vec<IntersectionFeature>, OverlayError> {
    let mut repaired = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        if !feature.geometry.0.iter().all(has_finite_coords) {
            return Err(OverlayError::NonFiniteGeometry { index });
        }
        let (polygons, _) = sanitize_geometry(&Geometry::MultiPolygon(feature.geometry.clone()));
        repaired.push(DeforestationFeature {
            year: feature.year,
            class: feature.class.clone(),
            geometry: MultiPolygon::new(polygons),
        });
    }

    progress.set_total((rings.len() * repaired.len()) as u64);
    progress.set_position(0);
    progress.set_message("clipping per ring".to_string());

    let mut tagged: Vec<(usize, usize, IntersectionFeature)> = Vec::new();
    for (ring_index, ring) in rings.rings.iter().enumerate() {
        let ring_geometry = if ring.geometry.is_valid() {
            ring.geometry.clone()
        } else {
            let (polygons, _) = sanitize_geometry(&Geometry::MultiPolygon(ring.geometry.clone()));
            MultiPolygon::new(polygons)
        };
        let ring_rect = ring_geometry.bounding_rect();

        for (feature_index, feature) in repaired.iter().enumerate() {
            progress.inc(1);
            let overlaps = match (ring_rect, feature.geometry.bounding_rect()) {
                (Some(a), Some(b)) => a.intersects(&b),
                _ => false,
            };
            if !overlaps {
                continue;
            }
            if let Some(p) = piece(&ring.ring_id, feature, &ring_geometry) {
                tagged.push((feature_index, ring_index, p));
            }
        }
    }
    progress.finish_and_clear();

    tagged.sort_by_key(|(f, r, _)| (*f, *r));
    Ok(tagged.into_iter().map(|(_, _, p)| p).collect())
}

/// Intersects every feature with every ring it overlaps.
///
/// Tries [`intersect_primary`] and falls back to [`intersect_fallback`].
///
/// # Errors
///
/// Returns [`OverlayError::BothStrategiesFailed`] if neither strategy
/// succeeds.
pub fn intersect_rings(
    features: &[DeforestationFeature],
    rings: &RingSet,
    progress: &dyn ProgressCallback,
) -> Result<OverlayOutcome, OverlayError> {
    match intersect_primary(features, rings, progress) {
        Ok(pieces) => Ok(OverlayOutcome::Primary(pieces)),
        Err(primary) => {
            log::warn!("Overlay failed ({primary}), retrying with per-ring clipping");
            match intersect_fallback(features, rings, progress) {
                Ok(pieces) => Ok(OverlayOutcome::Fallback {
                    features: pieces,
                    reason: primary.to_string(),
                }),
                Err(fallback) => Err(OverlayError::BothStrategiesFailed {
                    primary: Box::new(primary),
                    fallback: Box::new(fallback),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use deforest_rings_models::progress::NullProgress;
    use deforest_rings_models::{Ring, RingBounds};
    use geo::polygon;

    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]])
    }

    /// Three vertical strips over a 3 km x 1 km area.
    fn rings() -> RingSet {
        RingSet::new(vec![
            Ring::new(RingBounds::closed(0.0, 5.0), rect(0.0, 0.0, 1_000.0, 1_000.0)),
            Ring::new(RingBounds::closed(5.0, 10.0), rect(1_000.0, 0.0, 2_000.0, 1_000.0)),
            Ring::new(RingBounds::open(10.0), rect(2_000.0, 0.0, 3_000.0, 1_000.0)),
        ])
    }

    fn defo(year: i32, geometry: MultiPolygon<f64>) -> DeforestationFeature {
        DeforestationFeature {
            year,
            class: None,
            geometry,
        }
    }

    #[test]
    fn contained_hundred_hectares() {
        // 1 km x 1 km = 100 ha, fully inside the middle ring.
        let features = vec![defo(2020, rect(1_000.0, 0.0, 2_000.0, 1_000.0))];
        let outcome = intersect_rings(&features, &rings(), &NullProgress).unwrap();
        assert_eq!(outcome.strategy(), Strategy::Primary);

        let pieces = outcome.features();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].ring_id, "5-10km");
        assert_eq!(pieces[0].year, 2020);
        assert!((pieces[0].area_ha - 100.0).abs() < 1e-9);
    }

    #[test]
    fn area_is_conserved_across_rings() {
        let features = vec![defo(2019, rect(500.0, 200.0, 2_500.0, 700.0))];
        let pieces = intersect_rings(&features, &rings(), &NullProgress)
            .unwrap()
            .into_features();

        let ids: Vec<&str> = pieces.iter().map(|p| p.ring_id.as_str()).collect();
        assert_eq!(ids, vec!["0-5km", "5-10km", ">10km"]);

        let total: f64 = pieces.iter().map(|p| p.area_ha).sum();
        let expected = area_ha(&features[0].geometry);
        assert!((total - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let outcome = intersect_rings(&[], &rings(), &NullProgress).unwrap();
        assert!(outcome.features().is_empty());
    }

    #[test]
    fn self_intersecting_feature_uses_fallback() {
        let bow_tie = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 200.0, y: 200.0),
            (x: 200.0, y: 0.0),
            (x: 0.0, y: 200.0),
        ]]);
        let outcome = intersect_rings(&[defo(2021, bow_tie)], &rings(), &NullProgress).unwrap();
        assert_eq!(outcome.strategy(), Strategy::Fallback);
        let total: f64 = outcome.features().iter().map(|p| p.area_ha).sum();
        // Two triangles of 1 ha each.
        assert!((total - 2.0).abs() < 1e-6, "total = {total}");
    }

    #[test]
    fn non_finite_feature_fails_both_strategies() {
        let broken = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 10.0, y: 10.0),
        ]]);
        let err = intersect_rings(&[defo(2021, broken)], &rings(), &NullProgress).unwrap_err();
        assert!(matches!(err, OverlayError::BothStrategiesFailed { .. }));
    }

    #[test]
    fn strategies_agree_on_valid_input() {
        let features = vec![
            defo(2019, rect(100.0, 100.0, 1_500.0, 900.0)),
            defo(2020, rect(1_800.0, 0.0, 2_900.0, 500.0)),
            defo(2021, rect(5_000.0, 5_000.0, 5_100.0, 5_100.0)),
        ];
        let primary = intersect_primary(&features, &rings(), &NullProgress).unwrap();
        let fallback = intersect_fallback(&features, &rings(), &NullProgress).unwrap();
        assert_eq!(primary.len(), fallback.len());
        for (a, b) in primary.iter().zip(&fallback) {
            assert_eq!(a.ring_id, b.ring_id);
            assert_eq!(a.year, b.year);
            assert!((a.area_ha - b.area_ha).abs() < 1e-9);
        }
    }

    #[test]
    fn prefilter_drops_only_far_features() {
        let features = vec![
            defo(2019, rect(100.0, 100.0, 200.0, 200.0)),
            defo(2019, rect(50_000.0, 50_000.0, 50_001.0, 50_001.0)),
        ];
        let kept = prefilter_envelope(features, &rings());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn sanitize_explodes_multipolygons() {
        let two = MultiPolygon::new(vec![
            rect(0.0, 0.0, 10.0, 10.0).0[0].clone(),
            rect(20.0, 0.0, 30.0, 10.0).0[0].clone(),
        ]);
        let (out, stats) = sanitize_features(&[defo(2019, two)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.geometry.0.len() == 1 && f.year == 2019));
        assert_eq!(stats, SanitizeStats::default());
    }
}
