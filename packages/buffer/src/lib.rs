#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Distance rings around a road network.
//!
//! [`chunked::buffer_union`] buffers the network at one distance in
//! bounded batches. [`rings::build_rings`] runs it for every distance and
//! differences the nested unions into exclusive rings
//! (`0-d1`, `d1-d2`, ..., `>dn`) that partition the AOI.

pub mod chunked;
pub mod rings;

use deforest_rings_geometry::GeometryError;

pub use chunked::buffer_union;
pub use rings::{DistanceBuffer, RingBuild, build_rings, read_rings, rings_from_buffers};

/// Errors that can occur while building rings.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Batches must hold at least one segment.
    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    /// Buffer distances must be positive and finite.
    #[error("invalid buffer distance {distance_m} m")]
    InvalidDistance {
        /// Offending distance in metres.
        distance_m: f64,
    },

    /// A ring artifact could not be interpreted.
    #[error("malformed ring feature {index}: {message}")]
    MalformedRing {
        /// Feature position in the artifact.
        index: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Reading or reprojecting geometries failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
