//! Shared state for every subcommand.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use deforest_rings_buffer::RingError;
use deforest_rings_cli_utils::{IndicatifProgress, MultiProgress};
use deforest_rings_config::{ConfigError, PipelineConfig};
use deforest_rings_database::{DbError, PipelinePaths};
use deforest_rings_geometry::GeometryError;
use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::{Crs, DistanceSet, Stage};
use deforest_rings_overlay::OverlayError;
use deforest_rings_prepare::PrepareError;

/// Any failure a subcommand can report.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Geometry I/O error.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Input preparation error.
    #[error(transparent)]
    Prepare(#[from] PrepareError),

    /// Ring construction error.
    #[error(transparent)]
    Ring(#[from] RingError),

    /// Overlay error.
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    /// Store error.
    #[error(transparent)]
    Db(#[from] DbError),

    /// JSON output error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flags that override `pipeline.toml`.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Configuration file (default: `pipeline.toml` if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root data directory
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Buffer distance in km; repeat for several rings
    #[arg(long = "dist", global = true, value_name = "KM")]
    pub distances_km: Vec<f64>,

    /// Road segments buffered per batch
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Road classes to keep (e.g. `primary secondary`)
    #[arg(long = "road-class", global = true, num_args = 1.., value_name = "CLASS")]
    pub road_classes: Vec<String>,

    /// First deforestation year to keep
    #[arg(long, global = true)]
    pub year_min: Option<i32>,

    /// Last deforestation year to keep
    #[arg(long, global = true)]
    pub year_max: Option<i32>,

    /// Deforestation classes to keep
    #[arg(long = "class-keep", global = true, num_args = 1.., value_name = "CLASS")]
    pub class_keep: Vec<String>,
}

impl GlobalArgs {
    /// Writes every flag that was given into `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.paths.data_dir.clone_from(dir);
        }
        if !self.distances_km.is_empty() {
            config.rings.distances_km.clone_from(&self.distances_km);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.rings.chunk_size = chunk_size;
        }
        if !self.road_classes.is_empty() {
            config.roads.classes.clone_from(&self.road_classes);
        }
        if self.year_min.is_some() {
            config.deforestation.year_min = self.year_min;
        }
        if self.year_max.is_some() {
            config.deforestation.year_max = self.year_max;
        }
        if !self.class_keep.is_empty() {
            config.deforestation.class_keep.clone_from(&self.class_keep);
        }
    }
}

/// Validated configuration plus everything derived from it.
pub struct PipelineContext {
    /// Effective configuration.
    pub config: PipelineConfig,
    /// Input and artifact locations.
    pub paths: PipelinePaths,
    /// CRS assumed for inputs without one.
    pub geographic: Crs,
    /// Working CRS for buffering and areas.
    pub equal_area: Crs,
    /// Ring distances.
    pub distances: DistanceSet,
    multi: MultiProgress,
}

impl PipelineContext {
    /// Loads the config file, applies `args`, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the file cannot be loaded or the
    /// effective configuration is invalid.
    pub fn load(args: &GlobalArgs, multi: MultiProgress) -> Result<Self, CliError> {
        let mut config = PipelineConfig::load(args.config.as_deref())?;
        args.apply(&mut config);
        Self::new(config, multi)
    }

    /// Validates `config` and derives the CRSs, distances, and paths.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if `config` is invalid.
    pub fn new(config: PipelineConfig, multi: MultiProgress) -> Result<Self, CliError> {
        config.validate()?;
        Ok(Self {
            paths: PipelinePaths::from_config(&config.paths),
            geographic: config.crs.default_geographic()?,
            equal_area: config.crs.equal_area()?,
            distances: config.distance_set()?,
            config,
            multi,
        })
    }

    /// A progress bar for the work inside `stage`.
    #[must_use]
    pub fn work_bar(&self, stage: Stage) -> Arc<dyn ProgressCallback> {
        IndicatifProgress::work_bar(&self.multi, stage)
    }

    /// A progress bar counting `total` stages.
    #[must_use]
    pub fn stages_bar(&self, total: u64) -> Arc<dyn ProgressCallback> {
        IndicatifProgress::stages_bar(&self.multi, total)
    }
}
