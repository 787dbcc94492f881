#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line for the road-distance deforestation pipeline.
//!
//! Each stage has its own subcommand that reads the previous stage's
//! artifacts from `<data_dir>/processed/`, so a stage can be re-run
//! without repeating the ones before it. `run` executes them all and
//! `summary` queries the finished store.
//!
//! Logging goes through `indicatif-log-bridge` (via
//! [`deforest_rings_cli_utils::init_logger`]) so log lines and progress
//! bars share the terminal cleanly.

mod context;
mod pipeline;
mod stages;
mod summary;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use deforest_rings_cli_utils::MultiProgress;
use deforest_rings_database::{QueryFilter, Store};

use crate::context::{CliError, GlobalArgs, PipelineContext};
use crate::summary::Summary;

#[derive(Parser)]
#[command(
    name = "deforest_rings",
    about = "Deforestation by distance to the road network"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the area of interest from the boundary dataset
    Boundary,
    /// Clip (and optionally class-filter) the road network to the AOI
    Roads,
    /// Filter and clip the deforestation polygons to the AOI
    Deforestation,
    /// Buffer the roads and build the distance rings
    Rings,
    /// Intersect deforestation with the rings and aggregate
    Overlay,
    /// Build the DuckDB store from the overlay outputs
    Store,
    /// Run every stage in order
    Run,
    /// Print what the store holds
    Summary(SummaryArgs),
}

#[derive(Debug, clap::Args)]
struct SummaryArgs {
    /// Print JSON instead of text tables
    #[arg(long)]
    json: bool,

    /// First year to include
    #[arg(long)]
    from: Option<i32>,

    /// Last year to include
    #[arg(long)]
    to: Option<i32>,

    /// Ring to include; repeat for several (default: all)
    #[arg(long = "ring", value_name = "RING_ID")]
    rings: Vec<String>,

    /// Number of municipalities to list (default: `municipalities.top_n`)
    #[arg(long)]
    top: Option<usize>,
}

impl SummaryArgs {
    fn filter(&self) -> QueryFilter {
        QueryFilter {
            year_min: self.from,
            year_max: self.to,
            ring_ids: if self.rings.is_empty() {
                None
            } else {
                Some(self.rings.clone())
            },
        }
    }
}

fn execute(cli: Cli, multi: MultiProgress) -> Result<(), CliError> {
    let ctx = PipelineContext::load(&cli.global, multi)?;

    match cli.command {
        Commands::Boundary => {
            stages::boundary(&ctx)?;
        }
        Commands::Roads => {
            let aoi = stages::load_aoi(&ctx)?;
            stages::roads(&ctx, &aoi)?;
        }
        Commands::Deforestation => {
            let aoi = stages::load_aoi(&ctx)?;
            stages::deforestation(&ctx, &aoi)?;
        }
        Commands::Rings => {
            let aoi = stages::load_aoi(&ctx)?;
            let network = stages::load_clipped_roads(&ctx)?;
            stages::rings(&ctx, &aoi, &network)?;
        }
        Commands::Overlay => {
            let rings = stages::load_rings(&ctx)?;
            let features = stages::load_clipped_deforestation(&ctx)?;
            stages::overlay(&ctx, features, &rings)?;
        }
        Commands::Store => {
            let rings = stages::load_rings(&ctx)?;
            let intersections = stages::load_intersections(&ctx)?;
            let municipalities = stages::municipalities(&ctx, &intersections, &rings)?;
            stages::store(&ctx, &rings, &intersections, municipalities.as_deref())?;
        }
        Commands::Run => {
            pipeline::run(&ctx)?;
        }
        Commands::Summary(args) => {
            let store = Store::open(&ctx.paths.store())?;
            let limit = args.top.unwrap_or(ctx.config.municipalities.top_n);
            let summary = Summary::query(&store, &args.filter(), limit)?;
            if args.json {
                println!("{}", summary.to_json()?);
            } else {
                print!("{}", summary.to_text());
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let multi = deforest_rings_cli_utils::init_logger();
    let cli = Cli::parse();

    match execute(cli, multi) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use deforest_rings_config::PipelineConfig;

    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "deforest_rings",
            "run",
            "--data-dir",
            "/srv/rr",
            "--dist",
            "2",
            "--dist",
            "4",
            "--chunk-size",
            "500",
            "--road-class",
            "primary",
            "secondary",
            "--year-min",
            "2010",
            "--class-keep",
            "desmatamento",
        ])
        .unwrap();

        let mut config = PipelineConfig::default();
        cli.global.apply(&mut config);

        assert_eq!(config.paths.data_dir, std::path::PathBuf::from("/srv/rr"));
        assert_eq!(config.rings.distances_km, vec![2.0, 4.0]);
        assert_eq!(config.rings.chunk_size, 500);
        assert_eq!(config.roads.classes, vec!["primary", "secondary"]);
        assert_eq!(config.deforestation.year_min, Some(2010));
        assert_eq!(config.deforestation.year_max, None);
        assert_eq!(config.deforestation.class_keep, vec!["desmatamento"]);
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::try_parse_from(["deforest_rings", "rings"]).unwrap();
        let mut config = PipelineConfig::default();
        cli.global.apply(&mut config);
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn summary_filter_from_flags() {
        let cli = Cli::try_parse_from([
            "deforest_rings",
            "summary",
            "--json",
            "--from",
            "2015",
            "--ring",
            "0-5km",
        ])
        .unwrap();
        let Commands::Summary(args) = cli.command else {
            panic!("expected summary");
        };
        assert!(args.json);
        let filter = args.filter();
        assert_eq!(filter.year_min, Some(2015));
        assert_eq!(filter.year_max, None);
        assert_eq!(filter.ring_ids, Some(vec!["0-5km".to_string()]));
    }

    #[test]
    fn invalid_override_fails_validation() {
        let cli = Cli::try_parse_from(["deforest_rings", "run", "--dist", "10", "--dist", "5"])
            .unwrap();
        let mut config = PipelineConfig::default();
        cli.global.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
