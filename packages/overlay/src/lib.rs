#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overlay engine.
//!
//! Intersects deforestation polygons with the distance rings, recomputes
//! each piece's area in hectares, and aggregates by `(ring, year)` and by
//! ring. The [`municipality`] module does the same against municipality
//! polygons.

pub mod aggregate;
pub mod intersect;
pub mod municipality;

use deforest_rings_config::{AttributeError, OverlayConfig};
use deforest_rings_geometry::properties::{value_as_string, value_as_year};
use deforest_rings_geometry::sanitize::polygonal_parts;
use deforest_rings_geometry::{FeatureSet, GeoFeature, GeometryError, JsonObject, Reprojector};
use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::{
    Crs, DeforestationFeature, IntersectionFeature, RingSet, RingTotalArea, RingYearArea,
};
use geo::MultiPolygon;

pub use intersect::{OverlayOutcome, Strategy, area_ha, intersect_rings};
pub use municipality::{MunicipalityBreakdown, load_subdivisions, overlay_subdivisions};

/// Errors that can occur during the overlay.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// An input polygon is invalid (primary strategy precondition).
    #[error("invalid geometry: {what}")]
    InvalidGeometry {
        /// Which input was invalid.
        what: String,
    },

    /// A feature has a non-finite coordinate (fallback precondition).
    #[error("deforestation feature {index} has non-finite coordinates")]
    NonFiniteGeometry {
        /// Feature position.
        index: usize,
    },

    /// Neither the primary nor the fallback strategy succeeded.
    #[error("overlay failed: {primary}; fallback also failed: {fallback}")]
    BothStrategiesFailed {
        /// Primary strategy error.
        primary: Box<Self>,
        /// Fallback strategy error.
        fallback: Box<Self>,
    },

    /// There are no rings to overlay against.
    #[error("ring set is empty")]
    NoRings,

    /// An intersection artifact could not be interpreted.
    #[error("malformed intersection feature {index}: {message}")]
    MalformedIntersection {
        /// Feature position.
        index: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// A required attribute is missing.
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// Reading or reprojecting geometries failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Everything the overlay stage produces.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayOutput {
    /// Intersection pieces.
    pub intersections: Vec<IntersectionFeature>,
    /// Area by ring and year, ordered by year then ring.
    pub by_ring_year: Vec<RingYearArea>,
    /// Area by ring, largest first.
    pub by_ring: Vec<RingTotalArea>,
    /// Strategy that produced `intersections`.
    pub strategy: Strategy,
}

impl OverlayOutput {
    /// Builds the output (and its aggregates) from intersection pieces.
    #[must_use]
    pub fn from_intersections(
        intersections: Vec<IntersectionFeature>,
        rings: &RingSet,
        strategy: Strategy,
    ) -> Self {
        Self {
            by_ring_year: aggregate::by_ring_year(&intersections, rings),
            by_ring: aggregate::by_ring(&intersections, rings),
            intersections,
            strategy,
        }
    }

    /// Total intersected area in hectares.
    #[must_use]
    pub fn total_area_ha(&self) -> f64 {
        aggregate::total_area_ha(&self.intersections)
    }

    /// Whether the overlay produced nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }
}

/// Runs the overlay stage: optional envelope pre-filter and sanitization,
/// intersection with fallback, then aggregation.
///
/// An empty result is returned as a well-formed empty output with a
/// warning.
///
/// # Errors
///
/// Returns [`OverlayError::NoRings`] if `rings` is empty, or
/// [`OverlayError::BothStrategiesFailed`] if the intersection cannot be
/// computed.
pub fn run_overlay(
    features: Vec<DeforestationFeature>,
    rings: &RingSet,
    config: &OverlayConfig,
    progress: &dyn ProgressCallback,
) -> Result<OverlayOutput, OverlayError> {
    if rings.is_empty() {
        return Err(OverlayError::NoRings);
    }

    let features = if config.prefilter_envelope {
        intersect::prefilter_envelope(features, rings)
    } else {
        features
    };

    let features = if config.sanitize {
        let (clean, stats) = intersect::sanitize_features(&features);
        if stats.repaired > 0 || stats.dropped > 0 {
            log::info!(
                "Sanitized: {} polygons repaired, {} fragments dropped, {} polygons out",
                stats.repaired,
                stats.dropped,
                clean.len()
            );
        }
        clean
    } else {
        features
    };

    log::info!(
        "Intersecting {} features with {} rings",
        features.len(),
        rings.len()
    );
    let outcome = intersect_rings(&features, rings, progress)?;
    if let OverlayOutcome::Fallback { reason, .. } = &outcome {
        log::warn!("Overlay used the per-ring fallback: {reason}");
    }

    let strategy = outcome.strategy();
    let output = OverlayOutput::from_intersections(outcome.into_features(), rings, strategy);

    if output.is_empty() {
        log::warn!("Intersection is empty; check that the datasets overlap");
    } else {
        log::info!(
            "Overlay: {} pieces, {:.1} ha total",
            output.intersections.len(),
            output.total_area_ha()
        );
    }

    Ok(output)
}

/// Intersection pieces as features carrying `ring_id`, `year`, and
/// `area_ha`.
#[must_use]
pub fn intersection_features(features: &[IntersectionFeature]) -> Vec<GeoFeature> {
    features
        .iter()
        .map(|f| {
            let mut properties = JsonObject::new();
            properties.insert("ring_id".to_string(), serde_json::json!(f.ring_id));
            properties.insert("year".to_string(), serde_json::json!(f.year));
            properties.insert("area_ha".to_string(), serde_json::json!(f.area_ha));
            GeoFeature::new(f.geometry.clone(), properties)
        })
        .collect()
}

/// Reads an intersection artifact back, reprojecting to `target` and
/// recomputing every area from its geometry.
///
/// # Errors
///
/// Returns [`OverlayError::MalformedIntersection`] if a feature lacks
/// `ring_id` or `year`, or [`OverlayError::Geometry`] if reprojection
/// fails.
pub fn read_intersections(
    set: &FeatureSet,
    target: &Crs,
) -> Result<Vec<IntersectionFeature>, OverlayError> {
    let reprojector = Reprojector::new(&set.crs, target)?;
    let mut out = Vec::with_capacity(set.len());

    for (index, feature) in set.features.iter().enumerate() {
        let malformed = |message: &str| OverlayError::MalformedIntersection {
            index,
            message: message.to_string(),
        };
        let ring_id = feature
            .properties
            .get("ring_id")
            .and_then(value_as_string)
            .ok_or_else(|| malformed("missing ring_id"))?;
        let year = feature
            .properties
            .get("year")
            .and_then(value_as_year)
            .ok_or_else(|| malformed("missing year"))?;

        let mut parts = Vec::new();
        if let Some(geometry) = &feature.geometry {
            polygonal_parts(geometry, &mut parts);
        }
        let geometry = reprojector.geometry(&MultiPolygon::new(parts))?;

        out.push(IntersectionFeature {
            ring_id,
            year,
            area_ha: area_ha(&geometry),
            geometry,
        });
    }

    Ok(out)
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

    fn rings() -> RingSet {
        RingSet::new(vec![
            Ring::new(RingBounds::closed(0.0, 5.0), rect(0.0, 0.0, 1_000.0, 1_000.0)),
            Ring::new(RingBounds::open(5.0), rect(1_000.0, 0.0, 2_000.0, 1_000.0)),
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
    fn full_stage_aggregates() {
        let features = vec![
            defo(2019, rect(0.0, 0.0, 1_000.0, 1_000.0)),
            defo(2020, rect(500.0, 0.0, 1_500.0, 500.0)),
            defo(2020, rect(9_000.0, 9_000.0, 9_100.0, 9_100.0)),
        ];
        let out = run_overlay(features, &rings(), &OverlayConfig::default(), &NullProgress).unwrap();

        assert_eq!(out.strategy, Strategy::Primary);
        assert_eq!(out.intersections.len(), 3);
        assert!((out.total_area_ha() - 150.0).abs() < 1e-9);

        assert_eq!(out.by_ring[0].ring_id, "0-5km");
        assert!((out.by_ring[0].area_ha - 125.0).abs() < 1e-9);
        assert_eq!(out.by_ring_year.len(), 3);
        assert_eq!(out.by_ring_year[0].year, 2019);
    }

    #[test]
    fn empty_dataset_gives_empty_output() {
        let out = run_overlay(Vec::new(), &rings(), &OverlayConfig::default(), &NullProgress).unwrap();
        assert!(out.is_empty());
        assert!(out.by_ring.is_empty());
        assert!(out.by_ring_year.is_empty());
    }

    #[test]
    fn no_rings_is_an_error() {
        let err = run_overlay(Vec::new(), &RingSet::default(), &OverlayConfig::default(), &NullProgress)
            .unwrap_err();
        assert!(matches!(err, OverlayError::NoRings));
    }

    #[test]
    fn self_intersecting_feature_is_repaired_by_sanitize() {
        let bow_tie = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 200.0, y: 200.0),
            (x: 200.0, y: 0.0),
            (x: 0.0, y: 200.0),
        ]]);
        let out = run_overlay(
            vec![defo(2021, bow_tie)],
            &rings(),
            &OverlayConfig::default(),
            &NullProgress,
        )
        .unwrap();
        assert_eq!(out.strategy, Strategy::Primary);
        assert!((out.total_area_ha() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn intersections_roundtrip_with_recomputed_area() {
        let pieces = vec![IntersectionFeature {
            ring_id: "0-5km".to_string(),
            year: 2020,
            area_ha: 999.0,
            geometry: rect(0.0, 0.0, 100.0, 100.0),
        }];
        let set = FeatureSet {
            features: intersection_features(&pieces),
            crs: Crs::equal_area_default(),
        };
        let read = read_intersections(&set, &Crs::equal_area_default()).unwrap();
        assert_eq!(read[0].ring_id, "0-5km");
        assert_eq!(read[0].year, 2020);
        assert!((read[0].area_ha - 1.0).abs() < 1e-12);
    }
}
