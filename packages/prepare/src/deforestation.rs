//! Yearly deforestation polygons: loading, filtering, and clipping.

use std::collections::{BTreeMap, BTreeSet};

use deforest_rings_config::{AttributeSelector, DeforestationConfig, ResolvedAttribute};
use deforest_rings_geometry::properties::{normalize_year, value_as_string, value_as_year};
use deforest_rings_geometry::sanitize::{SanitizeStats, polygonal_parts, sanitize_multi_polygon};
use deforest_rings_geometry::{FeatureSet, GeoFeature, JsonObject, Reprojector};
use deforest_rings_models::{Aoi, Crs, DeforestationFeature};
use geo::{Area as _, BooleanOps as _, BoundingRect as _, Intersects as _, MultiPolygon};

use crate::PrepareError;

/// Property the clipped artifact stores the year under.
pub const YEAR_KEY: &str = "year";

/// Year range and class selection applied before clipping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeforestationFilter {
    /// Inclusive lower bound.
    pub year_min: Option<i32>,
    /// Inclusive upper bound.
    pub year_max: Option<i32>,
    /// Classes to keep, compared upper-case. Empty keeps all.
    pub class_keep: Vec<String>,
}

impl DeforestationFilter {
    /// Builds the filter from configuration.
    #[must_use]
    pub fn from_config(config: &DeforestationConfig) -> Self {
        Self {
            year_min: config.year_min,
            year_max: config.year_max,
            class_keep: config.class_keep.clone(),
        }
    }

    /// Whether the filter keeps everything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.year_min.is_none() && self.year_max.is_none() && self.class_keep.is_empty()
    }

    /// Applies the filter.
    ///
    /// Filtering down to nothing is not an error; it is logged.
    #[must_use]
    pub fn apply(&self, mut features: Vec<DeforestationFeature>) -> Vec<DeforestationFeature> {
        if self.is_empty() {
            return features;
        }
        let before = features.len();

        if let Some(min) = self.year_min {
            features.retain(|f| f.year >= min);
        }
        if let Some(max) = self.year_max {
            features.retain(|f| f.year <= max);
        }
        if self.year_min.is_some() || self.year_max.is_some() {
            log::info!(
                "Year filter {}..={}: {}/{before} features",
                self.year_min.map_or_else(|| "*".to_string(), |y| y.to_string()),
                self.year_max.map_or_else(|| "*".to_string(), |y| y.to_string()),
                features.len()
            );
        }

        if !self.class_keep.is_empty() {
            if !features.is_empty() && features.iter().all(|f| f.class.is_none()) {
                log::warn!("Deforestation carries no class attribute, ignoring class filter");
            } else {
                let keep: BTreeSet<String> = self
                    .class_keep
                    .iter()
                    .map(|c| c.trim().to_uppercase())
                    .collect();
                let n0 = features.len();
                features.retain(|f| {
                    f.class
                        .as_deref()
                        .is_some_and(|c| keep.contains(&c.trim().to_uppercase()))
                });
                log::info!("Class filter {keep:?}: {}/{n0} features", features.len());
            }
        }

        if features.is_empty() {
            log::warn!("No deforestation features left after filtering ({before} before)");
        }
        features
    }
}

/// Reads deforestation features (in the dataset's CRS).
///
/// An empty dataset yields an empty list. Features whose year cannot be
/// read, or that have no polygonal geometry, are skipped with a warning.
///
/// # Errors
///
/// Returns [`PrepareError::Attribute`] if a non-empty dataset has no year
/// attribute and no default, or [`PrepareError::InvalidYearDefault`] if
/// the configured default is not a year.
pub fn load_deforestation(
    set: &FeatureSet,
    config: &DeforestationConfig,
) -> Result<Vec<DeforestationFeature>, PrepareError> {
    if set.is_empty() {
        log::warn!("Deforestation dataset is empty");
        return Ok(Vec::new());
    }

    let keys = set.property_keys();
    let year = config
        .year_attribute
        .resolve("deforestation", keys.iter().copied())?;
    let constant_year = match &year {
        ResolvedAttribute::Column(_) => None,
        ResolvedAttribute::Constant(value) => Some(
            value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(normalize_year)
                .ok_or_else(|| PrepareError::InvalidYearDefault {
                    value: value.clone(),
                })?,
        ),
    };
    let class_column = config.class_attribute.find(keys.iter().copied());

    let mut no_year = 0_usize;
    let mut no_polygon = 0_usize;
    let mut features = Vec::with_capacity(set.len());

    for feature in &set.features {
        let year = match (&year, constant_year) {
            (_, Some(y)) => Some(y),
            (ResolvedAttribute::Column(column), None) => {
                feature.properties.get(column).and_then(value_as_year)
            }
            (ResolvedAttribute::Constant(_), None) => None,
        };
        let Some(year) = year else {
            no_year += 1;
            continue;
        };

        let mut parts = Vec::new();
        if let Some(geometry) = &feature.geometry {
            polygonal_parts(geometry, &mut parts);
        }
        if parts.is_empty() {
            no_polygon += 1;
            continue;
        }

        features.push(DeforestationFeature {
            year,
            class: class_column
                .as_deref()
                .and_then(|c| feature.properties.get(c))
                .and_then(value_as_string),
            geometry: MultiPolygon::new(parts),
        });
    }

    if no_year > 0 {
        log::warn!("Skipped {no_year} deforestation features without a usable year");
    }
    if no_polygon > 0 {
        log::warn!("Skipped {no_polygon} deforestation features without polygon geometry");
    }
    log::info!("Loaded {} deforestation features", features.len());

    Ok(features)
}

/// Reprojects features into `target` without clipping.
///
/// # Errors
///
/// Returns [`PrepareError::Geometry`] if reprojection fails.
pub fn project_deforestation(
    features: Vec<DeforestationFeature>,
    source: &Crs,
    target: &Crs,
) -> Result<Vec<DeforestationFeature>, PrepareError> {
    let reprojector = Reprojector::new(source, target)?;
    features
        .into_iter()
        .map(|f| {
            Ok(DeforestationFeature {
                geometry: reprojector.geometry(&f.geometry)?,
                ..f
            })
        })
        .collect()
}

/// Reprojects features into the AOI's CRS and intersects them with the
/// AOI.
///
/// With `sanitize`, invalid polygons are repaired before intersecting.
/// Pieces with no remaining area are dropped.
///
/// # Errors
///
/// Returns [`PrepareError::Geometry`] if reprojection fails.
pub fn clip_deforestation(
    features: Vec<DeforestationFeature>,
    source: &Crs,
    aoi: &Aoi,
    sanitize: bool,
) -> Result<Vec<DeforestationFeature>, PrepareError> {
    let total = features.len();
    let projected = project_deforestation(features, source, &aoi.crs)?;
    let Some(aoi_rect) = aoi.geometry.bounding_rect() else {
        log::warn!("AOI is empty, no deforestation kept");
        return Ok(Vec::new());
    };

    let mut stats = SanitizeStats::default();
    let mut clipped = Vec::new();
    for feature in projected {
        let geometry = if sanitize {
            let (clean, s) = sanitize_multi_polygon(&feature.geometry);
            stats.merge(s);
            clean
        } else {
            feature.geometry
        };

        let overlaps = geometry
            .bounding_rect()
            .is_some_and(|r| r.intersects(&aoi_rect));
        if !overlaps {
            continue;
        }

        let inside = aoi.geometry.intersection(&geometry);
        if inside.unsigned_area() > 0.0 {
            clipped.push(DeforestationFeature {
                geometry: inside,
                ..feature
            });
        }
    }

    if stats.repaired > 0 || stats.dropped > 0 {
        log::info!(
            "Sanitized deforestation: {} repaired, {} fragments dropped",
            stats.repaired,
            stats.dropped
        );
    }
    log::info!("Deforestation: {}/{total} features inside the AOI", clipped.len());

    if clipped.is_empty() {
        log::warn!("No deforestation features intersect the AOI");
    } else {
        for (year, count) in count_by_year(&clipped) {
            log::info!("  {year}: {count} features");
        }
    }

    Ok(clipped)
}

/// Feature counts per year.
#[must_use]
pub fn count_by_year(features: &[DeforestationFeature]) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for f in features {
        *counts.entry(f.year).or_insert(0) += 1;
    }
    counts
}

/// Attribute lookup for the pipeline's own clipped artifact: the year
/// under [`YEAR_KEY`] and the class under the configured name, whatever
/// the source dataset called them.
#[must_use]
pub fn artifact_config(config: &DeforestationConfig) -> DeforestationConfig {
    DeforestationConfig {
        year_attribute: AttributeSelector::named(YEAR_KEY),
        class_attribute: AttributeSelector::named(&config.class_attribute.name),
        ..config.clone()
    }
}

/// Deforestation features for writing: the year under [`YEAR_KEY`] plus
/// the class under `class_key`.
#[must_use]
pub fn deforestation_features(
    features: &[DeforestationFeature],
    class_key: &str,
) -> Vec<GeoFeature> {
    features
        .iter()
        .map(|f| {
            let mut properties = JsonObject::new();
            properties.insert(YEAR_KEY.to_string(), serde_json::json!(f.year));
            properties.insert(
                class_key.to_string(),
                f.class
                    .as_ref()
                    .map_or(serde_json::Value::Null, |c| serde_json::json!(c)),
            );
            GeoFeature::new(f.geometry.clone(), properties)
        })
        .collect()
}
