//! Minimal-overlap subset selection over cluster centroids.
//!
//! Exhaustive search over all combinations of a small pool. The pool is capped at
//! [`MAX_POOL_SIZE`] so at most 120 triples are scored.

use itertools::Itertools;

use crate::algorithm::filter::POPULATED_THRESHOLD;
use crate::data::ion_image::ValidityMask;
use crate::error::{Result, ThumbnailError};

/// Largest centroid pool searched exhaustively.
pub const MAX_POOL_SIZE: usize = 10;
/// Fraction of the valid area a good combination should cover together.
pub const TARGET_COVERAGE: f64 = 0.8;

/// Per-image coverage bitmaps over the valid pixels.
struct Coverage {
    covered: Vec<Vec<bool>>,
    pixel_count: usize,
}

impl Coverage {
    fn new(images: &[&[f32]], mask: &ValidityMask) -> Self {
        let active = mask.active_indices();
        let covered = images
            .iter()
            .map(|img| active.iter().map(|&p| img[p] > POPULATED_THRESHOLD).collect())
            .collect();
        Coverage { covered, pixel_count: active.len() }
    }

    /// nonoverlapping × (1 − |0.8 − covered|) × min single-image coverage,
    /// every term a fraction of the valid pixel count.
    fn score(&self, idxs: &[usize]) -> f64 {
        if self.pixel_count == 0 {
            return 0.0;
        }
        let total = self.pixel_count as f64;

        let mut exactly_one = 0usize;
        let mut at_least_one = 0usize;
        for p in 0..self.pixel_count {
            let hits = idxs.iter().filter(|&&i| self.covered[i][p]).count();
            if hits == 1 {
                exactly_one += 1;
            }
            if hits >= 1 {
                at_least_one += 1;
            }
        }
        let min_population = idxs
            .iter()
            .map(|&i| self.covered[i].iter().filter(|&&c| c).count())
            .min()
            .unwrap_or(0);

        let nonoverlapping = exactly_one as f64 / total;
        let sum_population = at_least_one as f64 / total;
        let min_population = min_population as f64 / total;

        nonoverlapping * (1.0 - (TARGET_COVERAGE - sum_population).abs()) * min_population
    }
}

/// Score of one combination of images, see [`pick_least_overlapping`].
pub fn overlap_score(images: &[&[f32]], mask: &ValidityMask, idxs: &[usize]) -> f64 {
    Coverage::new(images, mask).score(idxs)
}

/// Indices of the `num_to_pick` images that best tile the valid area.
///
/// Ties go to the first combination in lexicographic order. Pools no larger
/// than `num_to_pick` are returned whole.
pub fn pick_least_overlapping(
    images: &[&[f32]],
    mask: &ValidityMask,
    num_to_pick: usize,
) -> Result<Vec<usize>> {
    if images.len() > MAX_POOL_SIZE {
        return Err(ThumbnailError::GenerationFailure(format!(
            "centroid pool of {} exceeds the exhaustive search limit of {}",
            images.len(),
            MAX_POOL_SIZE
        )));
    }
    if images.len() <= num_to_pick {
        return Ok((0..images.len()).collect());
    }

    let coverage = Coverage::new(images, mask);
    let mut best: Option<(Vec<usize>, f64)> = None;
    for idxs in (0..images.len()).combinations(num_to_pick) {
        let score = coverage.score(&idxs);
        match &best {
            Some((_, s)) if score <= *s => {}
            _ => best = Some((idxs, score)),
        }
    }

    let (idxs, score) = best.ok_or_else(|| {
        ThumbnailError::GenerationFailure("no centroid combination to choose from".to_string())
    })?;
    tracing::debug!(?idxs, score, "picked least overlapping centroids");
    Ok(idxs)
}
