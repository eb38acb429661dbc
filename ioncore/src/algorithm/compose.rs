//! Compositing representative images or pixel clusters into an RGBA raster.

use serde::{Deserialize, Serialize};

use crate::algorithm::centralness::sort_by_centralness;
use crate::algorithm::kmeans::{squared_distance, KMeans, KMeansSettings, NUM_REPRESENTATIVES};
use crate::data::ion_image::ValidityMask;
use crate::data::thumbnail::Thumbnail;
use crate::error::{Result, ThumbnailError};

/// Display colors for pixel clusters, dimmest cluster first.
pub const CLUSTER_COLORS: [[f32; 3]; NUM_REPRESENTATIVES] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];

/// Stack three representative images as R, G, B with the mask as alpha.
///
/// The representatives are ordered by centralness first, so similar inputs
/// get the same colors run to run.
pub fn compose_image_channels(
    representatives: Vec<Vec<f32>>,
    mask: &ValidityMask,
) -> Result<Thumbnail> {
    if representatives.len() != NUM_REPRESENTATIVES {
        return Err(ThumbnailError::GenerationFailure(format!(
            "expected {} representative images, got {}",
            NUM_REPRESENTATIVES,
            representatives.len()
        )));
    }
    let (height, width) = mask.shape();
    let ordered = sort_by_centralness(representatives, height, width);
    Thumbnail::from_planes([ordered[0].as_slice(), ordered[1].as_slice(), ordered[2].as_slice()], mask)
}

/// How a pixel's brightness is derived in the pixel-cluster compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelIntensity {
    /// Mean intensity across all images.
    MeanIntensity,
    /// One minus distance to the cluster centroid over the mean cluster radius.
    DistanceFromCentroid,
}

/// Cluster valid pixels by their intensity profile across `images` and color each
/// pixel by its cluster.
///
/// Colors are assigned by ascending mean cluster intensity. Each color channel is
/// divided by its maximum; masked-out pixels stay zero with zero alpha.
pub fn compose_pixel_clusters(
    images: &[&[f32]],
    mask: &ValidityMask,
    intensity: PixelIntensity,
    settings: &KMeansSettings,
) -> Result<Thumbnail> {
    let n = mask.len();
    let active = mask.active_indices();
    let mut planes = [vec![0.0f32; n], vec![0.0f32; n], vec![0.0f32; n]];

    if active.is_empty() || images.is_empty() {
        return Thumbnail::from_planes([planes[0].as_slice(), planes[1].as_slice(), planes[2].as_slice()], mask);
    }

    // one feature vector per valid pixel, one feature per image
    let pixels: Vec<Vec<f32>> = active
        .iter()
        .map(|&p| images.iter().map(|img| img[p]).collect())
        .collect();
    let samples: Vec<&[f32]> = pixels.iter().map(|v| v.as_slice()).collect();

    let fit = KMeans::new(NUM_REPRESENTATIVES, settings.clone()).fit(&samples)?;
    let k = fit.k();
    tracing::debug!(k, pixels = samples.len(), ?intensity, "clustered pixels");

    let pixel_intensity: Vec<f32> = match intensity {
        PixelIntensity::MeanIntensity => samples
            .iter()
            .map(|s| s.iter().sum::<f32>() / s.len() as f32)
            .collect(),
        PixelIntensity::DistanceFromCentroid => {
            let distances: Vec<f32> = samples
                .iter()
                .zip(fit.labels.iter())
                .map(|(s, &l)| squared_distance(s, &fit.centroids[l]).sqrt())
                .collect();
            let radii = cluster_means(&distances, &fit.labels, k);
            distances
                .iter()
                .zip(fit.labels.iter())
                .map(|(&d, &l)| if radii[l] > 0.0 { 1.0 - d / radii[l] } else { 1.0 })
                .collect()
        }
    };

    // rank clusters by mean intensity, dimmest gets the first color
    let label_intensity = cluster_means(&pixel_intensity, &fit.labels, k);
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| label_intensity[a].total_cmp(&label_intensity[b]));
    let mut color_of = vec![0usize; k];
    for (rank, &label) in order.iter().enumerate() {
        color_of[label] = rank;
    }

    for ((&p, &label), &value) in active.iter().zip(fit.labels.iter()).zip(pixel_intensity.iter()) {
        let color = CLUSTER_COLORS[color_of[label]];
        for c in 0..3 {
            planes[c][p] = color[c] * value;
        }
    }

    for plane in planes.iter_mut() {
        let max = active.iter().map(|&p| plane[p]).fold(f32::NEG_INFINITY, f32::max);
        if max > 0.0 {
            for &p in &active {
                plane[p] /= max;
            }
        }
    }

    Thumbnail::from_planes([planes[0].as_slice(), planes[1].as_slice(), planes[2].as_slice()], mask)
}

/// Mean of `values` per label; empty labels get 0.
fn cluster_means(values: &[f32], labels: &[usize], k: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; k];
    let mut counts = vec![0usize; k];
    for (&v, &l) in values.iter().zip(labels.iter()) {
        sums[l] += v as f64;
        counts[l] += 1;
    }
    sums.iter()
        .zip(counts.iter())
        .map(|(&s, &c)| if c > 0 { (s / c as f64) as f32 } else { 0.0 })
        .collect()
}
