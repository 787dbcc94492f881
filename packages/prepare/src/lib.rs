#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input preparation: the first three pipeline stages.
//!
//! * [`boundary`] picks the administrative polygon that becomes the AOI.
//! * [`roads`] reprojects the road network and clips it to the AOI.
//! * [`deforestation`] loads yearly deforestation polygons, filters them
//!   by year and class, and clips them to the AOI.
//!
//! Every stage output is expressed in the AOI's (equal-area) CRS.

pub mod boundary;
pub mod deforestation;
pub mod roads;

use deforest_rings_config::attribute::AttributeError;
use deforest_rings_geometry::GeometryError;
use geo::{MultiPolygon, Polygon};

pub use boundary::{extract_boundary, read_aoi};
pub use deforestation::{DeforestationFilter, clip_deforestation, load_deforestation};
pub use roads::{clip_roads, filter_road_classes, load_roads};

/// Errors that can occur while preparing inputs.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// Reading, writing, or reprojecting geometries failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// A required attribute is missing from a dataset.
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// No feature in the boundary dataset matched the configured code or
    /// name.
    #[error(
        "no boundary matches code {} or name {}",
        .code.as_deref().unwrap_or("-"),
        .name.as_deref().unwrap_or("-")
    )]
    BoundaryNotFound {
        /// Code that was searched for.
        code: Option<String>,
        /// Name that was searched for.
        name: Option<String>,
    },

    /// The selected boundary has no polygonal area.
    #[error("{label} has no polygonal area")]
    EmptyAoi {
        /// Dataset label.
        label: String,
    },

    /// The road-class filter removed every segment.
    #[error("road class filter [{}] kept 0 of {before} segments", .classes.join(", "))]
    NoRoadsAfterFilter {
        /// Requested classes.
        classes: Vec<String>,
        /// Segment count before filtering.
        before: usize,
    },

    /// The configured default year is not a number.
    #[error("default year '{value}' is not a year")]
    InvalidYearDefault {
        /// Configured value.
        value: String,
    },
}

/// Dissolves polygons into a single multipolygon.
fn dissolve(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    geo::unary_union(polygons.iter())
}

#[cfg(test)]
mod tests {
    use geo::{Area as _, polygon};

    use super::*;

    #[test]
    fn dissolve_merges_adjacent_squares() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let b = polygon![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0)];
        let merged = dissolve(&[a, b]);
        assert_eq!(merged.0.len(), 1);
        assert!((merged.unsigned_area() - 2.0).abs() < 1e-9);
    }
}
