//! Candidate image filtering.
//!
//! Discards ion images that are nearly empty or nearly saturated inside the
//! sampled area, since those cluster poorly and make uninformative thumbnails.
//! Falls back to progressively looser selections when too few images survive.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::ion_image::{CandidateSet, ValidityMask};

/// Intensity above which a pixel counts as populated (normalized scale).
pub const POPULATED_THRESHOLD: f32 = 0.25;
/// Exclusive lower bound of the accepted fill factor band.
pub const MIN_FILL_FACTOR: f32 = 0.2;
/// Exclusive upper bound of the accepted fill factor band.
pub const MAX_FILL_FACTOR: f32 = 0.8;
/// Minimum number of survivors before a looser selection is tried.
pub const MIN_GOOD_IMAGES: usize = 20;

/// Fraction of valid pixels whose intensity exceeds [`POPULATED_THRESHOLD`].
///
/// Returns 0 when the mask has no valid pixels.
pub fn fill_factor(image: &[f32], mask: &ValidityMask) -> f32 {
    let active = mask.active_count();
    if active == 0 {
        return 0.0;
    }
    let populated = image
        .iter()
        .zip(mask.pixels.iter())
        .filter(|&(&v, &m)| m && v > POPULATED_THRESHOLD)
        .count();
    populated as f32 / active as f32
}

/// Which selection rule produced the filtered set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillSelection {
    /// Fill factor strictly inside the band.
    Band,
    /// Any image with a populated pixel.
    NonEmpty,
    /// Everything, unfiltered.
    All,
}

/// Fill factor band filter with fallback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub min_fill: f32,
    pub max_fill: f32,
    pub min_images: usize,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            min_fill: MIN_FILL_FACTOR,
            max_fill: MAX_FILL_FACTOR,
            min_images: MIN_GOOD_IMAGES,
        }
    }
}

impl CandidateFilter {
    #[inline]
    pub fn in_band(&self, fill: f32) -> bool {
        fill > self.min_fill && fill < self.max_fill
    }

    /// Indices of the images to keep, and the rule that selected them.
    ///
    /// Indices preserve rank order.
    pub fn select(&self, images: &[&[f32]], mask: &ValidityMask) -> (Vec<usize>, FillSelection) {
        let fills: Vec<f32> = images
            .par_iter()
            .map(|img| fill_factor(img, mask))
            .collect();

        let band: Vec<usize> = (0..fills.len()).filter(|&i| self.in_band(fills[i])).collect();
        if band.len() >= self.min_images {
            return (band, FillSelection::Band);
        }

        let non_empty: Vec<usize> = (0..fills.len()).filter(|&i| fills[i] > 0.0).collect();
        if non_empty.len() >= self.min_images {
            return (non_empty, FillSelection::NonEmpty);
        }

        ((0..fills.len()).collect(), FillSelection::All)
    }

    /// Filter a candidate set, returning borrowed views of the kept images.
    pub fn filter<'a>(&self, candidates: &'a CandidateSet, mask: &ValidityMask) -> Vec<&'a [f32]> {
        let images: Vec<&[f32]> = candidates.iter().collect();
        let (keep, selection) = self.select(&images, mask);
        tracing::debug!(
            kept = keep.len(),
            total = images.len(),
            ?selection,
            "filtered candidate images"
        );
        keep.into_iter().map(|i| images[i]).collect()
    }
}
