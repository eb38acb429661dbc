use serde::{Deserialize, Serialize};

use crate::error::{Result, ThumbnailError};

/// Boolean validity mask marking which pixels belong to the sampled area.
///
/// Stored row-major, shared by every ion image of one dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidityMask {
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<bool>,
}

impl ValidityMask {
    pub fn new(height: usize, width: usize, pixels: Vec<bool>) -> Result<Self> {
        if pixels.len() != height * width {
            return Err(ThumbnailError::PixelCountMismatch {
                shape: (height, width),
                expected: height * width,
                got: pixels.len(),
            });
        }
        Ok(ValidityMask { height, width, pixels })
    }

    /// Mask with every pixel valid.
    pub fn full(height: usize, width: usize) -> Self {
        ValidityMask { height, width, pixels: vec![true; height * width] }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Number of valid pixels.
    pub fn active_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// Flat indices of the valid pixels, in row-major order.
    pub fn active_indices(&self) -> Vec<usize> {
        self.pixels
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| if p { Some(i) } else { None })
            .collect()
    }
}

/// Ranked ion images of one dataset, each flattened to `height * width` intensities.
///
/// Images are expected to be resized to a common shape and hotspot-normalized,
/// so intensities lie in `[0, 1]`. Order is the upstream rank, best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub height: usize,
    pub width: usize,
    pub images: Vec<Vec<f32>>,
}

impl CandidateSet {
    pub fn new(height: usize, width: usize, images: Vec<Vec<f32>>) -> Result<Self> {
        let n_pixels = height * width;
        for image in &images {
            if image.len() != n_pixels {
                return Err(ThumbnailError::PixelCountMismatch {
                    shape: (height, width),
                    expected: n_pixels,
                    got: image.len(),
                });
            }
        }
        Ok(CandidateSet { height, width, images })
    }

    pub fn empty(height: usize, width: usize) -> Self {
        CandidateSet { height, width, images: Vec::new() }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn n_pixels(&self) -> usize {
        self.height * self.width
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.images.iter().map(|img| img.as_slice())
    }

    /// Check that the mask covers exactly the same pixel grid as the images,
    /// and that every intensity is a finite number.
    pub fn validate_against(&self, mask: &ValidityMask) -> Result<()> {
        if self.shape() != mask.shape() || mask.len() != self.n_pixels() {
            return Err(ThumbnailError::ImageShapeMismatch {
                expected: self.shape(),
                got: mask.shape(),
            });
        }
        for (i, image) in self.images.iter().enumerate() {
            if image.len() != self.n_pixels() {
                return Err(ThumbnailError::PixelCountMismatch {
                    shape: self.shape(),
                    expected: self.n_pixels(),
                    got: image.len(),
                });
            }
            if image.iter().any(|v| !v.is_finite()) {
                return Err(ThumbnailError::GenerationFailure(format!(
                    "candidate image {} contains non-finite intensities",
                    i
                )));
            }
        }
        Ok(())
    }
}

/// Prepend zero images until at least `n` vectors are present.
///
/// Real images keep their relative order and occupy the trailing slots.
pub fn zero_pad_front(vectors: Vec<Vec<f32>>, n: usize, len: usize) -> Vec<Vec<f32>> {
    if vectors.len() >= n {
        return vectors;
    }
    let mut padded = vec![vec![0.0f32; len]; n - vectors.len()];
    padded.extend(vectors);
    padded
}
