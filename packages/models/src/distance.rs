//! Validated distance sets.

use crate::ring::RingBounds;

/// Reasons a distance list is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DistanceSetError {
    /// No distances were given.
    #[error("distance list is empty: at least one buffer distance is required")]
    Empty,

    /// A distance is NaN or infinite.
    #[error("distance #{index} is not a finite number ({value})")]
    NotFinite {
        /// Position in the input list.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// A distance is zero or negative.
    #[error("distance #{index} must be positive, got {value}")]
    NonPositive {
        /// Position in the input list.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// A distance repeats the one before it.
    #[error("distance #{index} ({value} km) is a duplicate")]
    Duplicate {
        /// Position in the input list.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// A distance is smaller than the one before it.
    #[error("distance #{index} ({value} km) is smaller than the previous distance ({previous} km); distances must be ascending")]
    OutOfOrder {
        /// Position in the input list.
        index: usize,
        /// The distance before it.
        previous: f64,
        /// Offending value.
        value: f64,
    },
}

/// An ascending, duplicate-free, non-empty list of positive buffer
/// distances in kilometres.
///
/// Input is never reordered: an unsorted or repeated list is a caller
/// mistake and is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceSet(Vec<f64>);

impl DistanceSet {
    /// Validates `distances_km`.
    ///
    /// # Errors
    ///
    /// Returns [`DistanceSetError`] if the list is empty, holds a
    /// non-finite or non-positive value, or is not strictly ascending.
    pub fn new(distances_km: Vec<f64>) -> Result<Self, DistanceSetError> {
        if distances_km.is_empty() {
            return Err(DistanceSetError::Empty);
        }

        for (index, &value) in distances_km.iter().enumerate() {
            if !value.is_finite() {
                return Err(DistanceSetError::NotFinite { index, value });
            }
            if value <= 0.0 {
                return Err(DistanceSetError::NonPositive { index, value });
            }
        }

        for (index, pair) in distances_km.windows(2).enumerate() {
            let (previous, value) = (pair[0], pair[1]);
            if value < previous {
                return Err(DistanceSetError::OutOfOrder {
                    index: index + 1,
                    previous,
                    value,
                });
            }
            if value <= previous {
                return Err(DistanceSetError::Duplicate {
                    index: index + 1,
                    value,
                });
            }
        }

        Ok(Self(distances_km))
    }

    /// Distances in kilometres, ascending.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of distances. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The largest distance.
    #[must_use]
    pub fn max_km(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// Bounds of the `len() + 1` rings this set partitions an AOI into:
    /// `0..d1`, `d1..d2`, ..., `d_n..`.
    #[must_use]
    pub fn ring_bounds(&self) -> Vec<RingBounds> {
        let mut bounds = Vec::with_capacity(self.0.len() + 1);
        let mut lower = 0.0;
        for &d in &self.0 {
            bounds.push(RingBounds::closed(lower, d));
            lower = d;
        }
        bounds.push(RingBounds::open(lower));
        bounds
    }
}

impl<'a> IntoIterator for &'a DistanceSet {
    type Item = &'a f64;
    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
