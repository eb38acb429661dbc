//! Centralness ordering of the representative images.
//!
//! The weighting is a separable cone: `|linspace(0, 2, n) - 1|` along each axis,
//! multiplied together. It is 1 in the corners and 0 through the center lines.

use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;

/// Added per pixel to the denominator so all-zero images score 0.
pub const INTENSITY_EPSILON: f32 = 0.01;

/// `|linspace(0, 2, n) - 1|`, a triangular profile peaking at both ends.
pub fn triangular_profile(n: usize) -> DVector<f32> {
    if n <= 1 {
        // linspace of a single point is just its start
        return DVector::from_element(n, 1.0);
    }
    let step = 2.0 / (n - 1) as f32;
    DVector::from_iterator(n, (0..n).map(|i| (i as f32 * step - 1.0).abs()))
}

/// Cone weighting for a `(height, width)` image, flattened row-major.
pub fn centralness_kernel(height: usize, width: usize) -> Vec<f32> {
    let cone: DMatrix<f32> = triangular_profile(height) * triangular_profile(width).transpose();
    let mut flat = Vec::with_capacity(height * width);
    for y in 0..height {
        for x in 0..width {
            flat.push(cone[(y, x)]);
        }
    }
    flat
}

/// Kernel-weighted intensity over total intensity.
pub fn centralness(image: &[f32], kernel: &[f32]) -> f32 {
    let weighted: f32 = image.iter().zip(kernel.iter()).map(|(v, k)| v * k).sum();
    let total: f32 = image.iter().map(|v| v + INTENSITY_EPSILON).sum();
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Sort ascending by centralness score, then reverse.
///
/// The sort is stable, so equal scores come out in reverse input order.
pub fn sort_by_centralness(samples: Vec<Vec<f32>>, height: usize, width: usize) -> Vec<Vec<f32>> {
    let kernel = centralness_kernel(height, width);
    let mut scored: Vec<(f32, Vec<f32>)> = samples
        .into_iter()
        .map(|s| (centralness(&s, &kernel), s))
        .collect();
    scored.sort_by_key(|(score, _)| OrderedFloat(*score));
    scored.into_iter().rev().map(|(_, s)| s).collect()
}
