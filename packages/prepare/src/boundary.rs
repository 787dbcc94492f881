//! Area-of-interest extraction.
//!
//! The boundary dataset holds one polygon per administrative unit. The
//! target unit is matched by code first, then by exact name, and finally
//! by scanning every text attribute for the name. All matching features
//! are dissolved into a single multipolygon.

use deforest_rings_config::BoundaryConfig;
use deforest_rings_geometry::properties::value_as_string;
use deforest_rings_geometry::sanitize::sanitize_geometry;
use deforest_rings_geometry::{FeatureSet, GeoFeature, JsonObject, Reprojector};
use deforest_rings_models::{Aoi, Crs, SQ_METERS_PER_SQ_KM};
use geo::{Area as _, Polygon};

use crate::{PrepareError, dissolve};

fn matching<'a>(
    set: &'a FeatureSet,
    column: &str,
    predicate: impl Fn(&str) -> bool,
) -> Vec<&'a GeoFeature> {
    set.features
        .iter()
        .filter(|f| {
            f.properties
                .get(column)
                .and_then(value_as_string)
                .is_some_and(|v| predicate(&v))
        })
        .collect()
}

/// Selects the boundary features matching `config`.
///
/// # Errors
///
/// Returns [`PrepareError::BoundaryNotFound`] when no strategy matches.
pub fn select_boundary<'a>(
    set: &'a FeatureSet,
    config: &BoundaryConfig,
) -> Result<Vec<&'a GeoFeature>, PrepareError> {
    let keys = set.property_keys();

    if let Some(code) = &config.code
        && let Some(column) = config.code_attribute.find(keys.iter().copied())
    {
        let wanted = code.trim().to_uppercase();
        let hits = matching(set, &column, |v| v.trim().to_uppercase() == wanted);
        if !hits.is_empty() {
            log::info!("Boundary matched by {column} = {wanted} ({} features)", hits.len());
            return Ok(hits);
        }
    }

    if let Some(name) = &config.name {
        let wanted = name.trim().to_lowercase();

        if let Some(column) = config.name_attribute.find(keys.iter().copied()) {
            let hits = matching(set, &column, |v| v.trim().to_lowercase() == wanted);
            if !hits.is_empty() {
                log::info!("Boundary matched by {column} = {name} ({} features)", hits.len());
                return Ok(hits);
            }
        }

        let hits: Vec<&GeoFeature> = set
            .features
            .iter()
            .filter(|f| {
                f.properties.values().any(|v| {
                    v.as_str()
                        .is_some_and(|s| s.to_lowercase().contains(&wanted))
                })
            })
            .collect();
        if !hits.is_empty() {
            log::warn!(
                "Boundary matched by scanning all text attributes for '{name}' ({} features)",
                hits.len()
            );
            return Ok(hits);
        }
    }

    Err(PrepareError::BoundaryNotFound {
        code: config.code.clone(),
        name: config.name.clone(),
    })
}

fn polygons_in(
    features: &[&GeoFeature],
    reprojector: &Reprojector,
) -> Result<Vec<Polygon<f64>>, PrepareError> {
    let mut polygons = Vec::new();
    for feature in features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let (parts, stats) = sanitize_geometry(geometry);
        if stats.repaired > 0 {
            log::debug!("Repaired {} invalid boundary polygons", stats.repaired);
        }
        for part in &parts {
            polygons.push(reprojector.geometry(part)?);
        }
    }
    Ok(polygons)
}

fn dissolve_aoi(
    features: &[&GeoFeature],
    source: &Crs,
    target: &Crs,
    label: &str,
) -> Result<Aoi, PrepareError> {
    let reprojector = Reprojector::new(source, target)?;
    let polygons = polygons_in(features, &reprojector)?;
    let geometry = dissolve(&polygons);

    if geometry.0.is_empty() {
        return Err(PrepareError::EmptyAoi {
            label: label.to_string(),
        });
    }

    if !target.is_geographic() {
        log::info!(
            "AOI: {} polygon(s), {:.1} km2",
            geometry.0.len(),
            geometry.unsigned_area() / SQ_METERS_PER_SQ_KM
        );
    }

    Ok(Aoi {
        geometry,
        crs: target.clone(),
    })
}

/// Extracts the AOI from the boundary dataset and reprojects it to
/// `target`.
///
/// # Errors
///
/// Returns [`PrepareError`] if no boundary matches, the match has no
/// polygonal area, or reprojection fails.
pub fn extract_boundary(
    set: &FeatureSet,
    config: &BoundaryConfig,
    target: &Crs,
) -> Result<Aoi, PrepareError> {
    let selected = select_boundary(set, config)?;
    dissolve_aoi(&selected, &set.crs, target, "boundary")
}

/// Rebuilds an [`Aoi`] from a previously written AOI artifact.
///
/// # Errors
///
/// Returns [`PrepareError`] if the artifact has no polygonal area or
/// reprojection fails.
pub fn read_aoi(set: &FeatureSet, target: &Crs) -> Result<Aoi, PrepareError> {
    let all: Vec<&GeoFeature> = set.features.iter().collect();
    dissolve_aoi(&all, &set.crs, target, "AOI")
}

/// The AOI as a single feature for writing.
#[must_use]
pub fn aoi_feature(aoi: &Aoi) -> GeoFeature {
    let mut properties = JsonObject::new();
    if !aoi.crs.is_geographic() {
        properties.insert(
            "area_km2".to_string(),
            serde_json::json!(aoi.geometry.unsigned_area() / SQ_METERS_PER_SQ_KM),
        );
    }
    GeoFeature::new(aoi.geometry.clone(), properties)
}
