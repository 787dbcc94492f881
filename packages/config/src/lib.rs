#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration.
//!
//! A single `pipeline.toml` describes where inputs live, which CRS to
//! work in, which boundary to extract, the buffer distances, and the
//! attribute names each dataset is read with. Every field has a default
//! matching the Roraima / PRODES / OSM setup, so an empty file (or no
//! file at all) is a valid configuration.

pub mod attribute;

use std::path::{Path, PathBuf};

use deforest_rings_models::crs::CrsParseError;
use deforest_rings_models::{Crs, DistanceSet, DistanceSetError};
use serde::{Deserialize, Serialize};

pub use attribute::{AttributeError, AttributeSelector, ResolvedAttribute};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),

    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A CRS field could not be parsed.
    #[error("invalid CRS in config: {0}")]
    Crs(#[from] CrsParseError),

    /// The distance list is invalid.
    #[error("invalid ring distances: {0}")]
    Distances(#[from] DistanceSetError),

    /// Any other invalid value.
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input and output locations.
    pub paths: PathsConfig,
    /// Coordinate reference systems.
    pub crs: CrsConfig,
    /// Boundary extraction.
    pub boundary: BoundaryConfig,
    /// Road network handling.
    pub roads: RoadsConfig,
    /// Ring construction.
    pub rings: RingsConfig,
    /// Deforestation dataset handling.
    pub deforestation: DeforestationConfig,
    /// Overlay behaviour.
    pub overlay: OverlayConfig,
    /// Municipality breakdowns.
    pub municipalities: MunicipalitiesConfig,
}

/// Input and output locations. Relative input paths are resolved
/// against `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root data directory; outputs go to `<data_dir>/processed`.
    pub data_dir: PathBuf,
    /// Administrative boundary (state) dataset.
    pub boundaries: PathBuf,
    /// Road segment dataset.
    pub roads: PathBuf,
    /// Yearly deforestation dataset.
    pub deforestation: PathBuf,
    /// Municipality dataset; breakdowns are skipped when absent.
    pub municipalities: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            boundaries: PathBuf::from("external/ibge_uf/BR_UF_2024.geojson"),
            roads: PathBuf::from("osm/gis_osm_roads_free_1.geojson"),
            deforestation: PathBuf::from("prodes/yearly_deforestation_biome.geojson"),
            municipalities: Some(PathBuf::from(
                "external/ibge_municipal/RR_Municipios_2024.geojson",
            )),
        }
    }
}

/// Coordinate reference systems, as `EPSG:<code>` or `+proj=` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrsConfig {
    /// Assumed CRS for inputs that do not declare one.
    pub default_geographic: String,
    /// Planar equal-area CRS (metres) used for buffering and areas.
    pub equal_area: String,
}

impl Default for CrsConfig {
    fn default() -> Self {
        Self {
            default_geographic: Crs::wgs84().to_string(),
            equal_area: Crs::equal_area_default().to_string(),
        }
    }
}

impl CrsConfig {
    /// Parsed fallback CRS for undeclared inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Crs`] if the value cannot be parsed.
    pub fn default_geographic(&self) -> Result<Crs, ConfigError> {
        Ok(self.default_geographic.parse()?)
    }

    /// Parsed equal-area CRS.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Crs`] if the value cannot be parsed.
    pub fn equal_area(&self) -> Result<Crs, ConfigError> {
        Ok(self.equal_area.parse()?)
    }
}

/// Which administrative polygon becomes the AOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Code to match (e.g. the state abbreviation `RR`).
    pub code: Option<String>,
    /// Name to match when the code does not (e.g. `Roraima`).
    pub name: Option<String>,
    /// Attribute holding the code.
    pub code_attribute: AttributeSelector,
    /// Attribute holding the name.
    pub name_attribute: AttributeSelector,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            code: Some("RR".to_string()),
            name: Some("Roraima".to_string()),
            code_attribute: AttributeSelector::with_fallbacks(
                "SIGLA_UF",
                &["SIGLA", "CD_UF", "UF", "UF_SIGLA", "SG_UF"],
            ),
            name_attribute: AttributeSelector::with_fallbacks(
                "NM_UF",
                &["NOME_UF", "NM_ESTADO", "NMUF", "NOME", "NOME_ESTADO"],
            ),
        }
    }
}

/// Road network handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadsConfig {
    /// Functional class attribute.
    pub class_attribute: AttributeSelector,
    /// Classes to keep for buffering; empty keeps all.
    pub classes: Vec<String>,
}

impl Default for RoadsConfig {
    fn default() -> Self {
        Self {
            class_attribute: AttributeSelector::named("fclass"),
            classes: Vec::new(),
        }
    }
}

/// Ring construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingsConfig {
    /// Ascending buffer distances in kilometres.
    pub distances_km: Vec<f64>,
    /// Road segments buffered per batch.
    pub chunk_size: usize,
    /// Write each distance's buffer-union as its own artifact.
    pub write_buffers: bool,
}

impl Default for RingsConfig {
    fn default() -> Self {
        Self {
            distances_km: vec![5.0, 10.0, 20.0],
            chunk_size: 20_000,
            write_buffers: true,
        }
    }
}

/// Deforestation dataset handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeforestationConfig {
    /// Year attribute.
    pub year_attribute: AttributeSelector,
    /// Classification attribute.
    pub class_attribute: AttributeSelector,
    /// Classes to keep (compared upper-case); empty keeps all.
    pub class_keep: Vec<String>,
    /// Inclusive lower year bound.
    pub year_min: Option<i32>,
    /// Inclusive upper year bound.
    pub year_max: Option<i32>,
}

impl Default for DeforestationConfig {
    fn default() -> Self {
        Self {
            year_attribute: AttributeSelector::with_fallbacks("year", &["ano"]),
            class_attribute: AttributeSelector::named("main_class"),
            class_keep: Vec::new(),
            year_min: None,
            year_max: None,
        }
    }
}

/// Overlay behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Drop deforestation features outside the rings' envelope first.
    pub prefilter_envelope: bool,
    /// Repair and explode deforestation geometries before overlaying.
    pub sanitize: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            prefilter_envelope: true,
            sanitize: true,
        }
    }
}

/// Municipality breakdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MunicipalitiesConfig {
    /// Municipality name attribute.
    pub name_attribute: AttributeSelector,
    /// Length of the ranking tables.
    pub top_n: usize,
}

impl Default for MunicipalitiesConfig {
    fn default() -> Self {
        Self {
            name_attribute: AttributeSelector::with_fallbacks(
                "NM_MUN",
                &[
                    "NM_MUNICIP",
                    "NM_MUNICIPIO",
                    "NOME_MUN",
                    "NM_MUN_2024",
                    "name",
                ],
            ),
            top_n: 10,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or fails
    /// validation.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration.
    ///
    /// With an explicit `path` the file must exist. Without one,
    /// [`DEFAULT_CONFIG_FILE`] is read if present and defaults are used
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing, a file
    /// cannot be read or parsed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) if !p.exists() => return Err(ConfigError::Missing(p.to_path_buf())),
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    log::info!("No {DEFAULT_CONFIG_FILE} found, using built-in defaults");
                    return Ok(Self::default());
                }
                p
            }
        };

        log::info!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crs.default_geographic()?;
        let equal_area = self.crs.equal_area()?;
        if equal_area.is_geographic() {
            return Err(ConfigError::Invalid {
                field: "crs.equal_area",
                message: format!("{equal_area} is geographic; a planar CRS in metres is required"),
            });
        }

        self.distance_set()?;

        if self.rings.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "rings.chunk_size",
                message: "must be at least 1".to_string(),
            });
        }

        if let (Some(min), Some(max)) = (self.deforestation.year_min, self.deforestation.year_max)
            && min > max
        {
            return Err(ConfigError::Invalid {
                field: "deforestation.year_min",
                message: format!("year_min ({min}) is after year_max ({max})"),
            });
        }

        if self.boundary.code.is_none() && self.boundary.name.is_none() {
            return Err(ConfigError::Invalid {
                field: "boundary",
                message: "either boundary.code or boundary.name must be set".to_string(),
            });
        }

        Ok(())
    }

    /// The validated ring distances.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Distances`] if the list is invalid.
    pub fn distance_set(&self) -> Result<DistanceSet, ConfigError> {
        Ok(DistanceSet::new(self.rings.distances_km.clone())?)
    }
}
