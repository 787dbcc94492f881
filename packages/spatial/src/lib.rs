#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory R-tree over polygons.
//!
//! Used by the overlay to find which rings (or municipalities) a
//! deforestation polygon can touch without testing every pair. Entries
//! keep their insertion position so callers can restore a deterministic
//! order after querying.

use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

/// A polygon stored in the R-tree with its payload.
struct PolygonEntry<T> {
    position: usize,
    envelope: AABB<[f64; 2]>,
    value: T,
    polygon: MultiPolygon<f64>,
}

impl<T> RTreeObject for PolygonEntry<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A hit returned by [`PolygonIndex::candidates`].
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a, T> {
    /// Insertion position of the entry.
    pub position: usize,
    /// Payload stored with the polygon.
    pub value: &'a T,
    /// The indexed polygon.
    pub polygon: &'a MultiPolygon<f64>,
}

/// Bulk-loaded R-tree of polygons keyed by an arbitrary payload.
///
/// Empty polygons have no envelope and are not indexed; they can never
/// intersect anything.
pub struct PolygonIndex<T> {
    tree: RTree<PolygonEntry<T>>,
    skipped: usize,
    extent: Option<Rect<f64>>,
}

impl<T> std::fmt::Debug for PolygonIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonIndex")
            .field("size", &self.tree.size())
            .field("skipped", &self.skipped)
            .field("extent", &self.extent)
            .finish()
    }
}

impl<T> PolygonIndex<T> {
    /// Builds an index from `(payload, polygon)` pairs.
    pub fn new(items: impl IntoIterator<Item = (T, MultiPolygon<f64>)>) -> Self {
        let mut skipped = 0;
        let mut extent: Option<Rect<f64>> = None;
        let mut entries = Vec::new();

        for (position, (value, polygon)) in items.into_iter().enumerate() {
            let Some(rect) = polygon.bounding_rect() else {
                skipped += 1;
                continue;
            };

            extent = Some(extent.map_or(rect, |e| merge_rects(e, rect)));
            entries.push(PolygonEntry {
                position,
                envelope: rect_envelope(rect),
                value,
                polygon,
            });
        }

        if skipped > 0 {
            log::debug!("Skipped {skipped} empty polygons while building spatial index");
        }

        Self {
            tree: RTree::bulk_load(entries),
            skipped,
            extent,
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Bounding rectangle of every indexed polygon.
    #[must_use]
    pub const fn extent(&self) -> Option<Rect<f64>> {
        self.extent
    }

    /// Entries whose envelope intersects `rect`, in insertion order.
    #[must_use]
    pub fn candidates(&self, rect: Rect<f64>) -> Vec<Candidate<'_, T>> {
        let mut hits: Vec<Candidate<'_, T>> = self
            .tree
            .locate_in_envelope_intersecting(&rect_envelope(rect))
            .map(|entry| Candidate {
                position: entry.position,
                value: &entry.value,
                polygon: &entry.polygon,
            })
            .collect();
        hits.sort_by_key(|c| c.position);
        hits
    }

    /// Entries whose envelope intersects the bounding box of `geometry`.
    ///
    /// An empty geometry has no candidates.
    #[must_use]
    pub fn candidates_for<G>(&self, geometry: &G) -> Vec<Candidate<'_, T>>
    where
        G: BoundingRect<f64, Output = Option<Rect<f64>>>,
    {
        geometry
            .bounding_rect()
            .map_or_else(Vec::new, |rect| self.candidates(rect))
    }
}

fn rect_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

fn merge_rects(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

#[cfg(test)]
mod tests {
    use geo::{coord, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]])
    }

    fn grid() -> PolygonIndex<&'static str> {
        PolygonIndex::new(vec![
            ("a", square(0.0, 0.0, 10.0)),
            ("b", square(10.0, 0.0, 10.0)),
            ("empty", MultiPolygon::new(vec![])),
            ("c", square(100.0, 100.0, 10.0)),
        ])
    }

    #[test]
    fn empty_polygons_are_not_indexed() {
        let index = grid();
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
    }

    #[test]
    fn candidates_come_back_in_insertion_order() {
        let index = grid();
        let hits = index.candidates(Rect::new(coord! { x: 5.0, y: 5.0 }, coord! { x: 15.0, y: 6.0 }));
        let values: Vec<&str> = hits.iter().map(|c| *c.value).collect();
        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(hits[1].position, 1);
    }

    #[test]
    fn candidates_for_far_geometry_is_empty() {
        let index = grid();
        assert!(index.candidates_for(&square(50.0, 50.0, 1.0)).is_empty());
        assert!(
            index
                .candidates_for(&MultiPolygon::<f64>::new(vec![]))
                .is_empty()
        );
    }

    #[test]
    fn extent_covers_everything() {
        let extent = grid().extent().unwrap();
        assert!((extent.min().x).abs() < f64::EPSILON);
        assert!((extent.max().y - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_index() {
        let index: PolygonIndex<u8> = PolygonIndex::new(Vec::new());
        assert!(index.is_empty());
        assert!(index.extent().is_none());
        assert!(index.candidates_for(&square(0.0, 0.0, 1.0)).is_empty());
    }
}
