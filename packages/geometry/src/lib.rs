#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry plumbing shared by every pipeline stage.
//!
//! * [`io`] reads and writes `GeoJSON` feature collections, carrying the
//!   legacy `crs` member so projected artifacts round-trip.
//! * [`project`] reprojects `geo` geometries between CRSes with `proj4rs`.
//! * [`sanitize`] repairs invalid polygons and explodes collections into
//!   simple polygons before any overlay.
//! * [`properties`] converts loosely typed attribute values.

pub mod io;
pub mod project;
pub mod properties;
pub mod sanitize;

use std::path::PathBuf;

pub use io::{FeatureSet, GeoFeature, JsonObject, read_features, write_features};
pub use project::Reprojector;

/// Errors that can occur while reading, writing, or transforming
/// geometries.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// A required input file does not exist.
    #[error("{label} not found: {}", .path.display())]
    MissingInput {
        /// Dataset label.
        label: String,
        /// Expected location.
        path: PathBuf,
    },

    /// File I/O failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A CRS could not be set up or a coordinate could not be transformed.
    #[error("projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },

    /// The file is valid `GeoJSON` but not something we can use.
    #[error("unsupported GeoJSON content in {}: {message}", .path.display())]
    Unsupported {
        /// Offending file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },
}
