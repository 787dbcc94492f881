#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Domain types for the road-distance deforestation pipeline.
//!
//! Everything downstream of dataset loading speaks these types: the area
//! of interest, road segments and deforestation polygons in a planar
//! equal-area CRS, the distance set and the rings derived from it, and
//! the intersection features and aggregate rows produced by the overlay.

pub mod crs;
pub mod distance;
pub mod progress;
pub mod ring;

use geo::{MultiLineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

pub use crs::Crs;
pub use distance::{DistanceSet, DistanceSetError};
pub use ring::{Ring, RingBounds, RingSet};

/// Square metres per hectare.
pub const SQ_METERS_PER_HECTARE: f64 = 10_000.0;

/// Square metres per square kilometre.
pub const SQ_METERS_PER_SQ_KM: f64 = 1_000_000.0;

/// Metres per kilometre.
pub const METERS_PER_KM: f64 = 1_000.0;

/// A pipeline stage, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Extract the area of interest from the administrative dataset.
    Boundary,
    /// Clip the road network to the AOI.
    Roads,
    /// Clip the deforestation polygons to the AOI.
    Deforestation,
    /// Build distance buffers and the ring partition.
    Rings,
    /// Overlay deforestation against the rings and aggregate.
    Overlay,
    /// Materialize the queryable store.
    Store,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: &[Self] = &[
        Self::Boundary,
        Self::Roads,
        Self::Deforestation,
        Self::Rings,
        Self::Overlay,
        Self::Store,
    ];
}

/// The area of interest: a single (multi)polygon used as the universal
/// clip region.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    /// Dissolved boundary geometry.
    pub geometry: MultiPolygon<f64>,
    /// CRS the geometry is expressed in.
    pub crs: Crs,
}

/// One road segment, already clipped to the AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    /// Functional class (OSM `fclass`), when the source carries one.
    pub class: Option<String>,
    /// Segment geometry. Clipping may split a segment into several parts.
    pub geometry: MultiLineString<f64>,
}

/// The road network restricted to the AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadNetwork {
    /// Segments in source order.
    pub segments: Vec<RoadSegment>,
    /// CRS the segments are expressed in.
    pub crs: Crs,
}

impl RoadNetwork {
    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the network has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// A yearly deforestation polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct DeforestationFeature {
    /// Year the clearing was mapped.
    pub year: i32,
    /// Classification (PRODES `main_class`), when present.
    pub class: Option<String>,
    /// Polygon geometry.
    pub geometry: MultiPolygon<f64>,
}

/// A deforestation feature clipped to one ring.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionFeature {
    /// Label of the ring this piece falls in.
    pub ring_id: String,
    /// Year inherited from the source feature.
    pub year: i32,
    /// Area of `geometry` in hectares, recomputed after clipping.
    pub area_ha: f64,
    /// Clipped geometry.
    pub geometry: MultiPolygon<f64>,
}

/// A named administrative subdivision (municipality).
#[derive(Debug, Clone, PartialEq)]
pub struct Subdivision {
    /// Subdivision name.
    pub name: String,
    /// Boundary geometry.
    pub geometry: MultiPolygon<f64>,
}

/// An intersection feature further clipped to one subdivision.
#[derive(Debug, Clone, PartialEq)]
pub struct SubdivisionFeature {
    /// Subdivision name.
    pub municipality: String,
    /// Ring label.
    pub ring_id: String,
    /// Year.
    pub year: i32,
    /// Area of the clipped piece in hectares.
    pub area_ha: f64,
}

/// Area summed by ring and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingYearArea {
    /// Ring label.
    pub ring_id: String,
    /// Year.
    pub year: i32,
    /// Summed area in hectares.
    pub area_ha: f64,
}

/// Area summed by ring over all years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingTotalArea {
    /// Ring label.
    pub ring_id: String,
    /// Summed area in hectares.
    pub area_ha: f64,
}

/// Area summed by municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityArea {
    /// Municipality name.
    pub municipality: String,
    /// Summed area in hectares.
    pub area_ha: f64,
}

/// Area summed by municipality and ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityRingArea {
    /// Municipality name.
    pub municipality: String,
    /// Ring label.
    pub ring_id: String,
    /// Summed area in hectares.
    pub area_ha: f64,
}

/// Area summed by municipality, year and ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityYearRingArea {
    /// Municipality name.
    pub municipality: String,
    /// Year.
    pub year: i32,
    /// Ring label.
    pub ring_id: String,
    /// Summed area in hectares.
    pub area_ha: f64,
}
