#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for pipeline inputs and artifacts.
//!
//! Inputs are resolved against the configured data directory; every
//! artifact lives under `<data_dir>/processed/`.

use std::path::{Path, PathBuf};

use deforest_rings_config::PathsConfig;
use deforest_rings_models::ring::format_km;

/// Resolved input and artifact locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    data_dir: PathBuf,
    boundaries: PathBuf,
    roads: PathBuf,
    deforestation: PathBuf,
    municipalities: Option<PathBuf>,
}

impl PipelinePaths {
    /// Resolves the configured paths. Absolute input paths are kept as-is.
    #[must_use]
    pub fn from_config(config: &PathsConfig) -> Self {
        let data_dir = config.data_dir.clone();
        let resolve = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                data_dir.join(path)
            }
        };

        Self {
            boundaries: resolve(&config.boundaries),
            roads: resolve(&config.roads),
            deforestation: resolve(&config.deforestation),
            municipalities: config.municipalities.as_deref().map(resolve),
            data_dir,
        }
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Administrative boundary dataset.
    #[must_use]
    pub fn boundaries_input(&self) -> &Path {
        &self.boundaries
    }

    /// Road segment dataset.
    #[must_use]
    pub fn roads_input(&self) -> &Path {
        &self.roads
    }

    /// Yearly deforestation dataset.
    #[must_use]
    pub fn deforestation_input(&self) -> &Path {
        &self.deforestation
    }

    /// Municipality dataset, if configured.
    #[must_use]
    pub fn municipalities_input(&self) -> Option<&Path> {
        self.municipalities.as_deref()
    }

    /// `<data_dir>/processed/`.
    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Dissolved area of interest.
    #[must_use]
    pub fn aoi(&self) -> PathBuf {
        self.processed_dir().join("aoi.geojson")
    }

    /// Roads clipped to the AOI.
    #[must_use]
    pub fn roads_clipped(&self) -> PathBuf {
        self.processed_dir().join("roads_clipped.geojson")
    }

    /// Deforestation clipped to the AOI.
    #[must_use]
    pub fn deforestation_clipped(&self) -> PathBuf {
        self.processed_dir().join("deforestation_clipped.geojson")
    }

    /// WGS84 sample of the clipped deforestation.
    #[must_use]
    pub fn deforestation_preview(&self) -> PathBuf {
        self.processed_dir().join("deforestation_preview.geojson")
    }

    /// Directory holding buffer-unions and rings.
    #[must_use]
    pub fn buffers_dir(&self) -> PathBuf {
        self.processed_dir().join("buffers")
    }

    /// Buffer-union at one distance.
    #[must_use]
    pub fn distance_buffer(&self, dist_km: f64) -> PathBuf {
        self.buffers_dir()
            .join(format!("roads_buffer_{}km.geojson", format_km(dist_km)))
    }

    /// Exclusive rings.
    #[must_use]
    pub fn rings(&self) -> PathBuf {
        self.buffers_dir().join("buffer_rings.geojson")
    }

    /// WGS84 copy of the rings.
    #[must_use]
    pub fn rings_preview(&self) -> PathBuf {
        self.buffers_dir().join("buffer_rings_preview.geojson")
    }

    /// Directory holding intersection outputs and the store.
    #[must_use]
    pub fn intersection_dir(&self) -> PathBuf {
        self.processed_dir().join("intersection")
    }

    /// Intersection pieces.
    #[must_use]
    pub fn intersections(&self) -> PathBuf {
        self.intersection_dir().join("intersections.geojson")
    }

    /// Area by ring and year.
    #[must_use]
    pub fn by_ring_year_csv(&self) -> PathBuf {
        self.intersection_dir().join("by_ring_year.csv")
    }

    /// Area by ring.
    #[must_use]
    pub fn by_ring_total_csv(&self) -> PathBuf {
        self.intersection_dir().join("by_ring_total.csv")
    }

    /// Area by municipality.
    #[must_use]
    pub fn by_municipality_csv(&self) -> PathBuf {
        self.intersection_dir().join("by_municipality.csv")
    }

    /// Area by municipality and ring.
    #[must_use]
    pub fn by_municipality_ring_csv(&self) -> PathBuf {
        self.intersection_dir().join("by_municipality_ring.csv")
    }

    /// Area by municipality, year, and ring.
    #[must_use]
    pub fn by_municipality_year_ring_csv(&self) -> PathBuf {
        self.intersection_dir().join("by_municipality_year_ring.csv")
    }

    /// The `DuckDB` store.
    #[must_use]
    pub fn store(&self) -> PathBuf {
        self.intersection_dir().join("intersections.duckdb")
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensures the parent directory of `path` exists.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> PipelinePaths {
        PipelinePaths::from_config(&PathsConfig {
            data_dir: PathBuf::from("/data"),
            boundaries: PathBuf::from("uf.geojson"),
            roads: PathBuf::from("/elsewhere/roads.geojson"),
            deforestation: PathBuf::from("prodes/yearly.geojson"),
            municipalities: None,
        })
    }

    #[test]
    fn relative_inputs_resolve_against_data_dir() {
        let p = paths();
        assert_eq!(p.boundaries_input(), Path::new("/data/uf.geojson"));
        assert_eq!(p.roads_input(), Path::new("/elsewhere/roads.geojson"));
        assert_eq!(
            p.deforestation_input(),
            Path::new("/data/prodes/yearly.geojson")
        );
        assert!(p.municipalities_input().is_none());
    }

    #[test]
    fn artifacts_live_under_processed() {
        let p = paths();
        assert_eq!(p.aoi(), Path::new("/data/processed/aoi.geojson"));
        assert_eq!(
            p.distance_buffer(5.0),
            Path::new("/data/processed/buffers/roads_buffer_5km.geojson")
        );
        assert_eq!(
            p.distance_buffer(2.5),
            Path::new("/data/processed/buffers/roads_buffer_2.5km.geojson")
        );
        assert_eq!(
            p.store(),
            Path::new("/data/processed/intersection/intersections.duckdb")
        );
    }
}
