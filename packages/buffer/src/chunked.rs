//! Batched buffer-union of a road network.
//!
//! Buffering every segment and unioning the lot at once needs memory
//! proportional to the whole network. Instead segments are buffered in
//! fixed-size batches; each batch is unioned, clipped to the AOI, and
//! kept, and the kept pieces are unioned at the end. Batches run one
//! after another and each batch's raw buffers are dropped before the next
//! one starts.

use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::{Aoi, METERS_PER_KM, RoadNetwork};
use geo::{BooleanOps as _, Buffer as _, MultiPolygon};

use crate::RingError;

/// Union of all segment buffers at `distance_m`, clipped to the AOI.
///
/// `chunk_size` only bounds peak memory; the result does not depend on
/// it beyond floating-point noise. An empty network gives an empty
/// multipolygon.
///
/// # Errors
///
/// Returns [`RingError::InvalidChunkSize`] if `chunk_size` is zero, or
/// [`RingError::InvalidDistance`] if `distance_m` is not positive and
/// finite.
pub fn buffer_union(
    network: &RoadNetwork,
    aoi: &Aoi,
    distance_m: f64,
    chunk_size: usize,
    progress: &dyn ProgressCallback,
) -> Result<MultiPolygon<f64>, RingError> {
    if chunk_size == 0 {
        return Err(RingError::InvalidChunkSize);
    }
    if !distance_m.is_finite() || distance_m <= 0.0 {
        return Err(RingError::InvalidDistance { distance_m });
    }

    let total = network.len();
    let km = distance_m / METERS_PER_KM;
    progress.set_total(total as u64);
    progress.set_position(0);
    progress.set_message(format!("{km:.1} km buffer"));

    let mut parts: Vec<MultiPolygon<f64>> = Vec::new();
    for (index, batch) in network.segments.chunks(chunk_size).enumerate() {
        let start = index * chunk_size;
        log::debug!(
            "  batch {start}:{} of {total} ({km:.1} km)",
            start + batch.len()
        );

        let buffers: Vec<MultiPolygon<f64>> = batch
            .iter()
            .map(|segment| segment.geometry.buffer(distance_m))
            .collect();
        let batch_union = geo::unary_union(buffers.iter());
        drop(buffers);

        let clipped = batch_union.intersection(&aoi.geometry);
        if !clipped.0.is_empty() {
            parts.push(clipped);
        }

        progress.inc(batch.len() as u64);
    }

    progress.finish_and_clear();

    Ok(match parts.len() {
        0 => MultiPolygon::new(Vec::new()),
        1 => parts.swap_remove(0),
        _ => geo::unary_union(parts.iter()),
    })
}
