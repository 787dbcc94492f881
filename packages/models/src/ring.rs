//! Ring bounds, labels, and the ordered ring partition.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Distance bounds of one ring, in kilometres.
///
/// The outermost ring has no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingBounds {
    /// Inclusive lower bound.
    pub min_km: f64,
    /// Exclusive upper bound, `None` for the open outer ring.
    pub max_km: Option<f64>,
}

impl RingBounds {
    /// A bounded ring `min_km..max_km`.
    #[must_use]
    pub const fn closed(min_km: f64, max_km: f64) -> Self {
        Self {
            min_km,
            max_km: Some(max_km),
        }
    }

    /// The open ring beyond `min_km`.
    #[must_use]
    pub const fn open(min_km: f64) -> Self {
        Self {
            min_km,
            max_km: None,
        }
    }

    /// Whether this is the open outer ring.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.max_km.is_none()
    }

    /// Deterministic label, e.g. `0-5km`, `5-10km`, `>20km`.
    #[must_use]
    pub fn ring_id(&self) -> String {
        match self.max_km {
            Some(max) => format!("{}-{}km", format_km(self.min_km), format_km(max)),
            None => format!(">{}km", format_km(self.min_km)),
        }
    }
}

/// Formats a kilometre value without a trailing `.0` for whole numbers.
#[must_use]
pub fn format_km(km: f64) -> String {
    if km.fract().abs() < f64::EPSILON {
        format!("{km:.0}")
    } else {
        format!("{km}")
    }
}

/// One distance band of the partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    /// Label derived from `bounds`.
    pub ring_id: String,
    /// Distance bounds.
    pub bounds: RingBounds,
    /// Band geometry, possibly empty.
    pub geometry: MultiPolygon<f64>,
}

impl Ring {
    /// Builds a ring, deriving its label from `bounds`.
    #[must_use]
    pub fn new(bounds: RingBounds, geometry: MultiPolygon<f64>) -> Self {
        Self {
            ring_id: bounds.ring_id(),
            bounds,
            geometry,
        }
    }
}

/// The ordered ring partition of an AOI.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RingSet {
    /// Rings ordered by increasing `min_km`.
    pub rings: Vec<Ring>,
}

impl RingSet {
    /// Wraps rings that are already ordered.
    #[must_use]
    pub const fn new(rings: Vec<Ring>) -> Self {
        Self { rings }
    }

    /// Ring labels in order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.rings.iter().map(|r| r.ring_id.as_str()).collect()
    }

    /// Position of `ring_id` in the partition.
    #[must_use]
    pub fn position(&self, ring_id: &str) -> Option<usize> {
        self.rings.iter().position(|r| r.ring_id == ring_id)
    }

    /// Looks up a ring by label.
    #[must_use]
    pub fn get(&self, ring_id: &str) -> Option<&Ring> {
        self.rings.iter().find(|r| r.ring_id == ring_id)
    }

    /// Number of rings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_whole_kilometres() {
        assert_eq!(RingBounds::closed(0.0, 5.0).ring_id(), "0-5km");
        assert_eq!(RingBounds::closed(10.0, 20.0).ring_id(), "10-20km");
        assert_eq!(RingBounds::open(20.0).ring_id(), ">20km");
    }

    #[test]
    fn labels_fractional_kilometres() {
        assert_eq!(RingBounds::closed(0.0, 2.5).ring_id(), "0-2.5km");
        assert_eq!(RingBounds::open(0.75).ring_id(), ">0.75km");
    }

    #[test]
    fn ring_set_lookup() {
        let set = RingSet::new(vec![
            Ring::new(RingBounds::closed(0.0, 5.0), MultiPolygon::new(vec![])),
            Ring::new(RingBounds::open(5.0), MultiPolygon::new(vec![])),
        ]);
        assert_eq!(set.ids(), vec!["0-5km", ">5km"]);
        assert_eq!(set.position(">5km"), Some(1));
        assert!(set.get("5-10km").is_none());
        assert!(set.rings[1].bounds.is_open());
    }
}
