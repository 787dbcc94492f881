//! Group-by aggregation of intersection pieces.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use deforest_rings_models::{IntersectionFeature, RingSet, RingTotalArea, RingYearArea};

/// Sort key placing known rings in partition order and unknown labels
/// after them, alphabetically.
pub(crate) fn ring_rank<'a>(rings: &RingSet, ring_id: &'a str) -> (usize, &'a str) {
    (rings.position(ring_id).unwrap_or(usize::MAX), ring_id)
}

/// Area summed by `(ring_id, year)`, ordered by year then ring.
#[must_use]
pub fn by_ring_year(features: &[IntersectionFeature], rings: &RingSet) -> Vec<RingYearArea> {
    let mut sums: BTreeMap<(i32, (usize, &str)), f64> = BTreeMap::new();
    for f in features {
        *sums.entry((f.year, ring_rank(rings, &f.ring_id))).or_insert(0.0) += f.area_ha;
    }

    sums.into_iter()
        .map(|((year, (_, ring_id)), area_ha)| RingYearArea {
            ring_id: ring_id.to_string(),
            year,
            area_ha,
        })
        .collect()
}

/// Area summed by `ring_id`, largest first (ties in ring order).
#[must_use]
pub fn by_ring(features: &[IntersectionFeature], rings: &RingSet) -> Vec<RingTotalArea> {
    let mut sums: BTreeMap<(usize, &str), f64> = BTreeMap::new();
    for f in features {
        *sums.entry(ring_rank(rings, &f.ring_id)).or_insert(0.0) += f.area_ha;
    }

    // BTreeMap iteration is already in ring order; a stable sort keeps it
    // for equal areas.
    let mut totals: Vec<RingTotalArea> = sums
        .into_iter()
        .map(|((_, ring_id), area_ha)| RingTotalArea {
            ring_id: ring_id.to_string(),
            area_ha,
        })
        .collect();
    totals.sort_by(|a, b| descending(a.area_ha, b.area_ha));
    totals
}

/// Comparator for sorting areas largest first.
pub(crate) fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Sum of every piece's area.
#[must_use]
pub fn total_area_ha(features: &[IntersectionFeature]) -> f64 {
    features.iter().map(|f| f.area_ha).sum()
}
