//! Municipality breakdowns.
//!
//! Intersection pieces are clipped once more against municipality
//! polygons (area recomputed per piece) and summed by municipality, ring,
//! and year. Rankings are derived from those sums.

use std::collections::BTreeMap;

use deforest_rings_config::{AttributeSelector, ResolvedAttribute};
use deforest_rings_geometry::properties::value_as_string;
use deforest_rings_geometry::sanitize::sanitize_geometry;
use deforest_rings_geometry::{FeatureSet, Reprojector};
use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::{
    Crs, IntersectionFeature, MunicipalityArea, MunicipalityRingArea, MunicipalityYearRingArea,
    RingSet, Subdivision, SubdivisionFeature,
};
use deforest_rings_spatial::PolygonIndex;
use geo::{BooleanOps as _, MultiPolygon};

use crate::OverlayError;
use crate::aggregate::{descending, ring_rank};
use crate::intersect::area_ha;

/// Reads municipality polygons, repaired and reprojected to `target`.
///
/// Features without polygonal geometry or without a name are skipped.
///
/// # Errors
///
/// Returns [`OverlayError::Attribute`] if the name attribute cannot be
/// resolved, or [`OverlayError::Geometry`] if reprojection fails.
pub fn load_subdivisions(
    set: &FeatureSet,
    name_attribute: &AttributeSelector,
    target: &Crs,
) -> Result<Vec<Subdivision>, OverlayError> {
    if set.is_empty() {
        log::warn!("Municipality dataset is empty");
        return Ok(Vec::new());
    }

    let keys = set.property_keys();
    let name = name_attribute.resolve("municipalities", keys.iter().copied())?;
    let reprojector = Reprojector::new(&set.crs, target)?;

    let mut skipped = 0_usize;
    let mut subdivisions = Vec::with_capacity(set.len());
    for feature in &set.features {
        let label = match &name {
            ResolvedAttribute::Column(column) => {
                feature.properties.get(column).and_then(value_as_string)
            }
            ResolvedAttribute::Constant(value) => Some(value.clone()),
        };
        let (Some(label), Some(geometry)) = (label, &feature.geometry) else {
            skipped += 1;
            continue;
        };

        let (polygons, _) = sanitize_geometry(geometry);
        if polygons.is_empty() {
            skipped += 1;
            continue;
        }

        subdivisions.push(Subdivision {
            name: label,
            geometry: reprojector.geometry(&MultiPolygon::new(polygons))?,
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} municipality features without a name or polygon");
    }
    log::info!("Loaded {} municipalities", subdivisions.len());
    Ok(subdivisions)
}

/// Clips intersection pieces against municipalities.
#[must_use]
pub fn overlay_subdivisions(
    features: &[IntersectionFeature],
    subdivisions: &[Subdivision],
    progress: &dyn ProgressCallback,
) -> Vec<SubdivisionFeature> {
    let index = PolygonIndex::new(
        subdivisions
            .iter()
            .map(|s| (s.name.as_str(), s.geometry.clone())),
    );

    progress.set_total(features.len() as u64);
    progress.set_position(0);
    progress.set_message("municipalities".to_string());

    let mut out = Vec::new();
    for feature in features {
        for candidate in index.candidates_for(&feature.geometry) {
            let clipped = candidate.polygon.intersection(&feature.geometry);
            let area = area_ha(&clipped);
            if area > 0.0 {
                out.push(SubdivisionFeature {
                    municipality: (*candidate.value).to_string(),
                    ring_id: feature.ring_id.clone(),
                    year: feature.year,
                    area_ha: area,
                });
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    if out.is_empty() && !features.is_empty() {
        log::warn!("No intersection piece falls inside any municipality");
    }
    out
}

/// Sums by municipality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MunicipalityBreakdown {
    /// Totals per municipality, largest first.
    pub totals: Vec<MunicipalityArea>,
    /// Totals per municipality and ring.
    pub by_ring: Vec<MunicipalityRingArea>,
    /// Totals per municipality, year, and ring.
    pub by_year_ring: Vec<MunicipalityYearRingArea>,
}

impl MunicipalityBreakdown {
    /// Aggregates clipped pieces.
    #[must_use]
    pub fn from_features(features: &[SubdivisionFeature], rings: &RingSet) -> Self {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        let mut by_ring: BTreeMap<(&str, (usize, &str)), f64> = BTreeMap::new();
        let mut by_year_ring: BTreeMap<(&str, i32, (usize, &str)), f64> = BTreeMap::new();

        for f in features {
            let rank = ring_rank(rings, &f.ring_id);
            *totals.entry(&f.municipality).or_insert(0.0) += f.area_ha;
            *by_ring.entry((&f.municipality, rank)).or_insert(0.0) += f.area_ha;
            *by_year_ring
                .entry((&f.municipality, f.year, rank))
                .or_insert(0.0) += f.area_ha;
        }

        let mut totals: Vec<MunicipalityArea> = totals
            .into_iter()
            .map(|(municipality, area_ha)| MunicipalityArea {
                municipality: municipality.to_string(),
                area_ha,
            })
            .collect();
        totals.sort_by(|a, b| descending(a.area_ha, b.area_ha));

        Self {
            totals,
            by_ring: by_ring
                .into_iter()
                .map(|((municipality, (_, ring_id)), area_ha)| MunicipalityRingArea {
                    municipality: municipality.to_string(),
                    ring_id: ring_id.to_string(),
                    area_ha,
                })
                .collect(),
            by_year_ring: by_year_ring
                .into_iter()
                .map(
                    |((municipality, year, (_, ring_id)), area_ha)| MunicipalityYearRingArea {
                        municipality: municipality.to_string(),
                        year,
                        ring_id: ring_id.to_string(),
                        area_ha,
                    },
                )
                .collect(),
        }
    }

    /// The `n` municipalities with the largest totals.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<MunicipalityArea> {
        self.totals.iter().take(n).cloned().collect()
    }

    /// The latest year present and its `n` largest municipalities.
    #[must_use]
    pub fn top_latest_year(&self, n: usize) -> Option<(i32, Vec<MunicipalityArea>)> {
        let latest = self.by_year_ring.iter().map(|r| r.year).max()?;

        let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
        for row in self.by_year_ring.iter().filter(|r| r.year == latest) {
            *sums.entry(&row.municipality).or_insert(0.0) += row.area_ha;
        }

        let mut ranked: Vec<MunicipalityArea> = sums
            .into_iter()
            .map(|(municipality, area_ha)| MunicipalityArea {
                municipality: municipality.to_string(),
                area_ha,
            })
            .collect();
        ranked.sort_by(|a, b| descending(a.area_ha, b.area_ha));
        ranked.truncate(n);
        Some((latest, ranked))
    }
}
