//! Polygon repair and decomposition.
//!
//! Overlay inputs must be simple, valid polygons. [`sanitize_geometry`]
//! gets any geometry there:
//!
//! 1. keep only polygonal parts (points and lines inside collections are
//!    dropped),
//! 2. re-node invalid polygons (self-intersections, bow-ties, bad ring
//!    orientation) with an even-odd fill, which splits them into valid
//!    pieces and keeps every lobe whatever its winding,
//! 3. explode everything into single polygons and drop zero-area pieces.

use geo::bool_ops::FillRule;
use geo::{
    Area as _, BooleanOps as _, CoordsIter as _, Geometry, MultiPolygon, Polygon, Validation as _,
};

/// Counters describing what sanitization changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    /// Invalid polygons that were re-noded.
    pub repaired: usize,
    /// Non-polygonal fragments, non-finite polygons, and zero-area pieces
    /// that were discarded.
    pub dropped: usize,
}

impl SanitizeStats {
    /// Adds another set of counters to this one.
    pub const fn merge(&mut self, other: Self) {
        self.repaired += other.repaired;
        self.dropped += other.dropped;
    }
}

/// Appends the polygonal parts of `geometry` to `out`, returning how many
/// non-polygonal parts were skipped.
pub fn polygonal_parts(geometry: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> usize {
    match geometry {
        Geometry::Polygon(p) => {
            out.push(p.clone());
            0
        }
        Geometry::MultiPolygon(mp) => {
            out.extend(mp.0.iter().cloned());
            0
        }
        Geometry::Rect(r) => {
            out.push(r.to_polygon());
            0
        }
        Geometry::Triangle(t) => {
            out.push(t.to_polygon());
            0
        }
        Geometry::GeometryCollection(gc) => gc.0.iter().map(|g| polygonal_parts(g, out)).sum(),
        Geometry::Point(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiPoint(_)
        | Geometry::MultiLineString(_) => 1,
    }
}

/// Whether every coordinate of `polygon` is finite.
#[must_use]
pub fn has_finite_coords(polygon: &Polygon<f64>) -> bool {
    polygon
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
}

/// Re-nodes an invalid polygon under the even-odd rule.
///
/// Lobes winding in opposite directions (a bow-tie) are all kept. The
/// result may hold zero, one, or several polygons.
#[must_use]
pub fn repair_polygon(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    polygon.union_with_fill_rule(&MultiPolygon::<f64>::new(Vec::new()), FillRule::EvenOdd)
}

/// Repairs and explodes `geometry` into simple, valid, non-empty
/// polygons.
#[must_use]
pub fn sanitize_geometry(geometry: &Geometry<f64>) -> (Vec<Polygon<f64>>, SanitizeStats) {
    let mut parts = Vec::new();
    let mut stats = SanitizeStats {
        repaired: 0,
        dropped: polygonal_parts(geometry, &mut parts),
    };

    let mut clean = Vec::with_capacity(parts.len());
    for part in parts {
        if !has_finite_coords(&part) {
            stats.dropped += 1;
            continue;
        }

        let pieces = if part.is_valid() {
            vec![part]
        } else {
            stats.repaired += 1;
            repair_polygon(&part).0
        };

        for piece in pieces {
            if piece.unsigned_area() > 0.0 {
                clean.push(piece);
            } else {
                stats.dropped += 1;
            }
        }
    }

    (clean, stats)
}

/// [`sanitize_geometry`] for a multipolygon, re-assembled into one
/// multipolygon.
#[must_use]
pub fn sanitize_multi_polygon(geometry: &MultiPolygon<f64>) -> (MultiPolygon<f64>, SanitizeStats) {
    let (polygons, stats) = sanitize_geometry(&Geometry::MultiPolygon(geometry.clone()));
    (MultiPolygon::new(polygons), stats)
}
