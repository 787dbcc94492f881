//! One function per pipeline stage, plus loaders that rebuild a stage's
//! output from its artifact when a stage runs on its own.
//!
//! Every stage writes its artifacts before returning so `run` and the
//! single-stage subcommands leave the same files behind.

use deforest_rings_buffer::rings::{buffer_feature, ring_areas_km2, ring_features};
use deforest_rings_buffer::{build_rings, read_rings};
use deforest_rings_database::{
    StoreInput, StoreSummary, build_store, write_municipality_csvs, write_ring_csvs,
};
use deforest_rings_geometry::{Reprojector, read_features, write_features};
use deforest_rings_models::{
    Aoi, Crs, DeforestationFeature, IntersectionFeature, RingSet, RoadNetwork, Stage,
    SubdivisionFeature,
};
use deforest_rings_overlay::{
    MunicipalityBreakdown, OverlayOutput, intersection_features, load_subdivisions,
    overlay_subdivisions, read_intersections, run_overlay,
};
use deforest_rings_prepare::boundary::aoi_feature;
use deforest_rings_prepare::deforestation::{
    artifact_config, deforestation_features, project_deforestation,
};
use deforest_rings_prepare::roads::{project_roads, road_features};
use deforest_rings_prepare::{
    DeforestationFilter, clip_deforestation, clip_roads, extract_boundary, filter_road_classes,
    load_deforestation, load_roads, read_aoi,
};

use crate::context::{CliError, PipelineContext};

/// Features copied into the deforestation preview.
const PREVIEW_FEATURES: usize = 100;

/// Stage 1: extracts and writes the AOI.
///
/// # Errors
///
/// Returns [`CliError`] if the boundary dataset cannot be read, no
/// boundary matches, or the AOI cannot be written.
pub fn boundary(ctx: &PipelineContext) -> Result<Aoi, CliError> {
    let set = read_features(
        ctx.paths.boundaries_input(),
        "boundaries",
        &ctx.geographic,
    )?;
    let aoi = extract_boundary(&set, &ctx.config.boundary, &ctx.equal_area)?;

    let path = ctx.paths.aoi();
    write_features(&path, [aoi_feature(&aoi)], &aoi.crs)?;
    log::info!("AOI written to {}", path.display());
    Ok(aoi)
}

/// Reads the AOI artifact.
///
/// # Errors
///
/// Returns [`CliError`] if the artifact is missing or unusable.
pub fn load_aoi(ctx: &PipelineContext) -> Result<Aoi, CliError> {
    let set = read_features(&ctx.paths.aoi(), "AOI", &ctx.geographic)?;
    Ok(read_aoi(&set, &ctx.equal_area)?)
}

/// Stage 2: clips, filters, and writes the road network.
///
/// # Errors
///
/// Returns [`CliError`] if the road dataset cannot be read, the class
/// filter removes every segment, or the artifact cannot be written.
pub fn roads(ctx: &PipelineContext, aoi: &Aoi) -> Result<RoadNetwork, CliError> {
    let class_attribute = &ctx.config.roads.class_attribute;
    let set = read_features(ctx.paths.roads_input(), "roads", &ctx.geographic)?;
    let segments = load_roads(&set, class_attribute);
    let network = clip_roads(segments, &set.crs, aoi)?;
    let network = filter_road_classes(network, &ctx.config.roads.classes)?;

    let path = ctx.paths.roads_clipped();
    let written = write_features(
        &path,
        road_features(&network, &class_attribute.name),
        &network.crs,
    )?;
    log::info!("{written} road segments written to {}", path.display());
    Ok(network)
}

/// Reads the clipped road artifact, re-applying the class filter.
///
/// # Errors
///
/// Returns [`CliError`] if the artifact is missing or the class filter
/// removes every segment.
pub fn load_clipped_roads(ctx: &PipelineContext) -> Result<RoadNetwork, CliError> {
    let set = read_features(&ctx.paths.roads_clipped(), "clipped roads", &ctx.geographic)?;
    let segments = load_roads(&set, &ctx.config.roads.class_attribute);
    let network = project_roads(segments, &set.crs, &ctx.equal_area)?;
    Ok(filter_road_classes(network, &ctx.config.roads.classes)?)
}

/// Stage 3: filters, clips, and writes the deforestation polygons, plus a
/// small WGS84 preview.
///
/// # Errors
///
/// Returns [`CliError`] if the dataset cannot be read or lacks a year
/// attribute, or an artifact cannot be written.
pub fn deforestation(
    ctx: &PipelineContext,
    aoi: &Aoi,
) -> Result<Vec<DeforestationFeature>, CliError> {
    let config = &ctx.config.deforestation;
    let set = read_features(
        ctx.paths.deforestation_input(),
        "deforestation",
        &ctx.geographic,
    )?;
    let features = load_deforestation(&set, config)?;
    let features = DeforestationFilter::from_config(config).apply(features);
    let clipped = clip_deforestation(features, &set.crs, aoi, ctx.config.overlay.sanitize)?;

    let class_key = &config.class_attribute.name;
    let path = ctx.paths.deforestation_clipped();
    let written = write_features(
        &path,
        deforestation_features(&clipped, class_key),
        &aoi.crs,
    )?;
    log::info!("{written} deforestation features written to {}", path.display());

    let sample: Vec<DeforestationFeature> =
        clipped.iter().take(PREVIEW_FEATURES).cloned().collect();
    let preview = project_deforestation(sample, &aoi.crs, &Crs::wgs84())?;
    write_features(
        &ctx.paths.deforestation_preview(),
        deforestation_features(&preview, class_key),
        &Crs::wgs84(),
    )?;

    Ok(clipped)
}

/// Reads the clipped deforestation artifact, re-applying the filters.
///
/// # Errors
///
/// Returns [`CliError`] if the artifact is missing or unreadable.
pub fn load_clipped_deforestation(
    ctx: &PipelineContext,
) -> Result<Vec<DeforestationFeature>, CliError> {
    let config = &ctx.config.deforestation;
    let set = read_features(
        &ctx.paths.deforestation_clipped(),
        "clipped deforestation",
        &ctx.geographic,
    )?;
    let features = load_deforestation(&set, &artifact_config(config))?;
    let features = project_deforestation(features, &set.crs, &ctx.equal_area)?;
    Ok(DeforestationFilter::from_config(config).apply(features))
}

/// Stage 4: buffers the roads, derives the rings, and writes the buffers,
/// the rings, and a WGS84 copy of the rings.
///
/// # Errors
///
/// Returns [`CliError`] if buffering fails or an artifact cannot be
/// written.
pub fn rings(
    ctx: &PipelineContext,
    aoi: &Aoi,
    network: &RoadNetwork,
) -> Result<RingSet, CliError> {
    let progress = ctx.work_bar(Stage::Rings);
    let build = build_rings(
        network,
        aoi,
        &ctx.distances,
        ctx.config.rings.chunk_size,
        progress.as_ref(),
    )?;

    if ctx.config.rings.write_buffers {
        for buffer in &build.buffers {
            write_features(
                &ctx.paths.distance_buffer(buffer.dist_km),
                [buffer_feature(buffer)],
                &aoi.crs,
            )?;
        }
    }

    let path = ctx.paths.rings();
    write_features(&path, ring_features(&build.rings), &aoi.crs)?;
    log::info!("Rings written to {}", path.display());

    for (ring_id, area_km2) in ring_areas_km2(&build.rings) {
        log::info!("  {ring_id:>10}: {area_km2:>12.2} km²");
    }

    let preview = reproject_rings(&build.rings, &aoi.crs, &Crs::wgs84())?;
    write_features(
        &ctx.paths.rings_preview(),
        ring_features(&preview),
        &Crs::wgs84(),
    )?;

    Ok(build.rings)
}

fn reproject_rings(rings: &RingSet, from: &Crs, to: &Crs) -> Result<RingSet, CliError> {
    let reprojector = Reprojector::new(from, to)?;
    let mut out = rings.clone();
    for ring in &mut out.rings {
        ring.geometry = reprojector.geometry(&ring.geometry)?;
    }
    Ok(out)
}

/// Reads the ring artifact.
///
/// # Errors
///
/// Returns [`CliError`] if the artifact is missing or malformed.
pub fn load_rings(ctx: &PipelineContext) -> Result<RingSet, CliError> {
    let set = read_features(&ctx.paths.rings(), "rings", &ctx.geographic)?;
    Ok(read_rings(&set, &ctx.equal_area)?)
}

/// Stage 5 output.
pub struct OverlayStage {
    /// Intersections and ring aggregates.
    pub output: OverlayOutput,
    /// Municipality pieces, when a municipality dataset is available.
    pub municipalities: Option<Vec<SubdivisionFeature>>,
}

/// Stage 5: overlays deforestation with the rings, writes the pieces and
/// CSV tables, and runs the municipality breakdown.
///
/// # Errors
///
/// Returns [`CliError`] if the overlay fails or an artifact cannot be
/// written.
pub fn overlay(
    ctx: &PipelineContext,
    features: Vec<DeforestationFeature>,
    rings: &RingSet,
) -> Result<OverlayStage, CliError> {
    let features = DeforestationFilter::from_config(&ctx.config.deforestation).apply(features);

    let progress = ctx.work_bar(Stage::Overlay);
    let output = run_overlay(features, rings, &ctx.config.overlay, progress.as_ref())?;

    let path = ctx.paths.intersections();
    write_features(
        &path,
        intersection_features(&output.intersections),
        &ctx.equal_area,
    )?;
    write_ring_csvs(&ctx.paths, &output.by_ring_year, &output.by_ring)?;
    log::info!(
        "Intersections written to {} ({:?} strategy)",
        path.display(),
        output.strategy
    );

    for row in &output.by_ring {
        log::info!("  {:>10}: {:>14.2} ha", row.ring_id, row.area_ha);
    }

    let municipalities = municipalities(ctx, &output.intersections, rings)?;
    Ok(OverlayStage {
        output,
        municipalities,
    })
}

/// Clips intersection pieces against municipalities and writes the
/// breakdown tables. Skipped when no municipality dataset is available.
///
/// # Errors
///
/// Returns [`CliError`] if the dataset cannot be read, has no name
/// attribute, or a table cannot be written.
pub fn municipalities(
    ctx: &PipelineContext,
    intersections: &[IntersectionFeature],
    rings: &RingSet,
) -> Result<Option<Vec<SubdivisionFeature>>, CliError> {
    let Some(input) = ctx.paths.municipalities_input() else {
        log::info!("No municipality dataset configured, skipping breakdowns");
        return Ok(None);
    };
    if !input.exists() {
        log::warn!(
            "Municipality dataset {} not found, skipping breakdowns",
            input.display()
        );
        return Ok(None);
    }

    let set = read_features(input, "municipalities", &ctx.geographic)?;
    let subdivisions = load_subdivisions(
        &set,
        &ctx.config.municipalities.name_attribute,
        &ctx.equal_area,
    )?;

    let progress = ctx.work_bar(Stage::Overlay);
    let pieces = overlay_subdivisions(intersections, &subdivisions, progress.as_ref());
    let breakdown = MunicipalityBreakdown::from_features(&pieces, rings);
    write_municipality_csvs(
        &ctx.paths,
        &breakdown.totals,
        &breakdown.by_ring,
        &breakdown.by_year_ring,
    )?;

    log_rankings(&breakdown, ctx.config.municipalities.top_n);
    Ok(Some(pieces))
}

fn log_rankings(breakdown: &MunicipalityBreakdown, top_n: usize) {
    if breakdown.totals.is_empty() {
        return;
    }

    log::info!("Top {top_n} municipalities (all years):");
    for (rank, row) in breakdown.top(top_n).iter().enumerate() {
        log::info!("  {:>2}. {:<30} {:>12.2} ha", rank + 1, row.municipality, row.area_ha);
    }

    if let Some((year, ranked)) = breakdown.top_latest_year(top_n) {
        log::info!("Top {top_n} municipalities in {year}:");
        for (rank, row) in ranked.iter().enumerate() {
            log::info!("  {:>2}. {:<30} {:>12.2} ha", rank + 1, row.municipality, row.area_ha);
        }
    }
}

/// Reads the intersection artifact.
///
/// # Errors
///
/// Returns [`CliError`] if the artifact is missing or malformed.
pub fn load_intersections(ctx: &PipelineContext) -> Result<Vec<IntersectionFeature>, CliError> {
    let set = read_features(&ctx.paths.intersections(), "intersections", &ctx.geographic)?;
    Ok(read_intersections(&set, &ctx.equal_area)?)
}

/// Stage 6: materializes the store.
///
/// # Errors
///
/// Returns [`CliError::Db`] if the store cannot be built.
pub fn store(
    ctx: &PipelineContext,
    rings: &RingSet,
    intersections: &[IntersectionFeature],
    municipalities: Option<&[SubdivisionFeature]>,
) -> Result<StoreSummary, CliError> {
    let progress = ctx.work_bar(Stage::Store);
    let summary = build_store(
        &ctx.paths.store(),
        &StoreInput {
            rings,
            intersections,
            municipalities,
        },
        progress.as_ref(),
    )?;
    Ok(summary)
}
