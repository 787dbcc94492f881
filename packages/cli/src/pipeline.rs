//! Full pipeline orchestrator.
//!
//! Chains boundary -> roads -> deforestation -> rings -> overlay -> store,
//! handing each stage's typed output to the next in memory. Every stage
//! still writes its artifacts, so any later stage can be re-run on its
//! own.

use std::time::Instant;

use deforest_rings_database::StoreSummary;
use deforest_rings_models::Stage;
use deforest_rings_models::progress::ProgressCallback as _;

use crate::context::{CliError, PipelineContext};
use crate::stages;

/// Runs every stage in order.
///
/// # Errors
///
/// Returns the first stage error; later stages are not attempted.
pub fn run(ctx: &PipelineContext) -> Result<StoreSummary, CliError> {
    let pipeline_start = Instant::now();
    let steps = ctx.stages_bar(Stage::ALL.len() as u64);
    let begin = |stage: Stage| {
        steps.set_message(stage.to_string());
        log::info!("=== {stage} ===");
        Instant::now()
    };
    let end = |stage: Stage, started: Instant| {
        log::info!("{stage} done in {:.1?}", started.elapsed());
        steps.inc(1);
    };

    let started = begin(Stage::Boundary);
    let aoi = stages::boundary(ctx)?;
    end(Stage::Boundary, started);

    let started = begin(Stage::Roads);
    let network = stages::roads(ctx, &aoi)?;
    end(Stage::Roads, started);

    let started = begin(Stage::Deforestation);
    let deforestation = stages::deforestation(ctx, &aoi)?;
    end(Stage::Deforestation, started);

    let started = begin(Stage::Rings);
    let rings = stages::rings(ctx, &aoi, &network)?;
    drop(network);
    end(Stage::Rings, started);

    let started = begin(Stage::Overlay);
    let overlay = stages::overlay(ctx, deforestation, &rings)?;
    end(Stage::Overlay, started);

    let started = begin(Stage::Store);
    let summary = stages::store(
        ctx,
        &rings,
        &overlay.output.intersections,
        overlay.municipalities.as_deref(),
    )?;
    end(Stage::Store, started);

    steps.finish(format!("done in {:.1?}", pipeline_start.elapsed()));
    log::info!(
        "Pipeline finished in {:.1?}: {:.1} ha across {} rings",
        pipeline_start.elapsed(),
        overlay.output.total_area_ha(),
        rings.len()
    );

    Ok(summary)
}
