//! K-means clustering over flattened image or pixel-feature vectors.
//!
//! Lloyd iterations with k-means++ seeding. Every restart draws from a
//! `StdRng` seeded from [`KMeansSettings::seed`], so a fixed seed gives
//! identical clusters run to run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::ion_image::zero_pad_front;
use crate::error::{Result, ThumbnailError};

/// Number of representatives a thumbnail is built from.
pub const NUM_REPRESENTATIVES: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansSettings {
    pub seed: u64,
    /// Independent restarts; the lowest inertia wins.
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence threshold on centroid movement, relative to the mean feature variance.
    pub tolerance: f64,
}

impl Default for KMeansSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            n_init: 4,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
    pub inertia: f64,
}

impl KMeansFit {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }
}

#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest centroid, first one on ties.
#[inline]
fn nearest(sample: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (j, c) in centroids.iter().enumerate() {
        let d = squared_distance(sample, c);
        if d < best.1 {
            best = (j, d);
        }
    }
    best
}

/// Index of the sample closest to `target`, first one on ties.
pub fn nearest_sample(samples: &[&[f32]], target: &[f32]) -> usize {
    let mut best = (0, f32::INFINITY);
    for (i, s) in samples.iter().enumerate() {
        let d = squared_distance(s, target);
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

#[derive(Clone, Debug)]
pub struct KMeans {
    pub k: usize,
    pub settings: KMeansSettings,
}

impl KMeans {
    pub fn new(k: usize, settings: KMeansSettings) -> Self {
        KMeans { k, settings }
    }

    /// Cluster `samples` into `min(k, samples.len())` groups.
    pub fn fit(&self, samples: &[&[f32]]) -> Result<KMeansFit> {
        let n = samples.len();
        if n == 0 {
            return Err(ThumbnailError::GenerationFailure(
                "k-means called without samples".to_string(),
            ));
        }
        let k = self.k.min(n);
        if k == 0 {
            return Err(ThumbnailError::GenerationFailure(
                "k-means requires at least one cluster".to_string(),
            ));
        }
        let dims = samples[0].len();
        if samples.iter().any(|s| s.len() != dims) {
            return Err(ThumbnailError::GenerationFailure(
                "k-means samples differ in dimensionality".to_string(),
            ));
        }

        let tol = self.settings.tolerance * mean_variance(samples);
        let mut best: Option<KMeansFit> = None;

        for run in 0..self.settings.n_init.max(1) {
            let mut rng = StdRng::seed_from_u64(self.settings.seed.wrapping_add(run as u64));
            let init = plus_plus_init(samples, k, &mut rng);
            let fit = lloyd(samples, init, self.settings.max_iter, tol);

            if !fit.inertia.is_finite() {
                return Err(ThumbnailError::GenerationFailure(
                    "k-means produced non-finite inertia".to_string(),
                ));
            }
            match &best {
                Some(b) if b.inertia <= fit.inertia => {}
                _ => best = Some(fit),
            }
        }

        best.ok_or_else(|| ThumbnailError::GenerationFailure("k-means did not run".to_string()))
    }
}

/// Mean of the per-dimension variances, used to scale the tolerance.
fn mean_variance(samples: &[&[f32]]) -> f64 {
    let dims = samples[0].len();
    if dims == 0 {
        return 0.0;
    }
    let total: f64 = (0..dims)
        .map(|d| samples.iter().map(|s| s[d] as f64).population_variance())
        .sum();
    total / dims as f64
}

/// k-means++ seeding.
fn plus_plus_init(samples: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let n = samples.len();
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    let mut d2: Vec<f64> = samples
        .iter()
        .map(|s| squared_distance(s, samples[chosen[0]]) as f64)
        .collect();

    while chosen.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = n - 1;
            for (i, &d) in d2.iter().enumerate() {
                acc += d;
                if acc > target && d > 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            // all remaining samples coincide with a chosen one
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        };
        chosen.push(next);

        for (i, s) in samples.iter().enumerate() {
            let d = squared_distance(s, samples[next]) as f64;
            if d < d2[i] {
                d2[i] = d;
            }
        }
    }

    chosen.iter().map(|&i| samples[i].to_vec()).collect()
}

fn lloyd(samples: &[&[f32]], mut centroids: Vec<Vec<f32>>, max_iter: usize, tol: f64) -> KMeansFit {
    let k = centroids.len();
    let dims = samples[0].len();

    for _ in 0..max_iter.max(1) {
        let assignment: Vec<(usize, f32)> = samples
            .par_iter()
            .map(|s| nearest(s, &centroids))
            .collect();

        let mut sums = vec![vec![0.0f64; dims]; k];
        let mut counts = vec![0usize; k];
        for (s, &(label, _)) in samples.iter().zip(assignment.iter()) {
            counts[label] += 1;
            for (acc, &v) in sums[label].iter_mut().zip(s.iter()) {
                *acc += v as f64;
            }
        }

        let mut updated: Vec<Vec<f32>> = sums
            .iter()
            .zip(counts.iter())
            .zip(centroids.iter())
            .map(|((sum, &count), old)| {
                if count == 0 {
                    old.clone()
                } else {
                    sum.iter().map(|&v| (v / count as f64) as f32).collect()
                }
            })
            .collect();

        // empty clusters are moved onto the worst-fitting samples
        let mut by_distance: Vec<usize> = (0..samples.len()).collect();
        by_distance.sort_by(|&a, &b| assignment[b].1.total_cmp(&assignment[a].1));
        let mut donors = by_distance.into_iter();
        for j in 0..k {
            if counts[j] == 0 {
                if let Some(i) = donors.next() {
                    updated[j] = samples[i].to_vec();
                }
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(updated.iter())
            .map(|(a, b)| squared_distance(a, b) as f64)
            .sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }

    let assignment: Vec<(usize, f32)> = samples
        .par_iter()
        .map(|s| nearest(s, &centroids))
        .collect();
    let inertia = assignment.iter().map(|&(_, d)| d as f64).sum();
    let labels = assignment.into_iter().map(|(l, _)| l).collect();

    KMeansFit { centroids, labels, inertia }
}

/// Centroids of an image clustering together with their medoids.
///
/// `medoids[i]` is the real sample closest to `centroids[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterResult {
    pub centroids: Vec<Vec<f32>>,
    pub medoids: Vec<Vec<f32>>,
}

impl ClusterResult {
    /// Keep only the clusters at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> ClusterResult {
        ClusterResult {
            centroids: indices.iter().map(|&i| self.centroids[i].clone()).collect(),
            medoids: indices.iter().map(|&i| self.medoids[i].clone()).collect(),
        }
    }
}

/// Cluster whole-image vectors into `k` groups.
///
/// With at most [`NUM_REPRESENTATIVES`] samples nothing is clustered: the
/// samples, zero-padded at the front to exactly three, serve as both
/// centroids and medoids.
pub fn cluster_images(
    samples: &[&[f32]],
    k: usize,
    n_pixels: usize,
    settings: &KMeansSettings,
) -> Result<ClusterResult> {
    if samples.len() <= NUM_REPRESENTATIVES {
        let padded = zero_pad_front(
            samples.iter().map(|s| s.to_vec()).collect(),
            NUM_REPRESENTATIVES,
            n_pixels,
        );
        return Ok(ClusterResult { centroids: padded.clone(), medoids: padded });
    }

    let fit = KMeans::new(k, settings.clone()).fit(samples)?;
    tracing::debug!(k = fit.k(), inertia = fit.inertia, "clustered candidate images");

    let medoids = fit
        .centroids
        .iter()
        .map(|c| samples[nearest_sample(samples, c)].to_vec())
        .collect();
    Ok(ClusterResult { centroids: fit.centroids, medoids })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
            vec![10.0, 0.0],
            vec![10.1, 0.0],
            vec![10.0, 0.1],
        ]
    }

    #[test]
    fn test_fit_separates_blobs() {
        let data = blobs();
        let samples: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let fit = KMeans::new(3, KMeansSettings::default()).fit(&samples).unwrap();

        assert_eq!(fit.k(), 3);
        for group in fit.labels.chunks(3) {
            assert!(group.iter().all(|&l| l == group[0]));
        }
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert_ne!(fit.labels[3], fit.labels[6]);
        assert_ne!(fit.labels[0], fit.labels[6]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn test_fit_is_deterministic_for_fixed_seed() {
        let data = blobs();
        let samples: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let settings = KMeansSettings { seed: 7, ..Default::default() };
        let a = KMeans::new(3, settings.clone()).fit(&samples).unwrap();
        let b = KMeans::new(3, settings).fit(&samples).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_k_is_capped_by_sample_count() {
        let data = vec![vec![0.0f32], vec![1.0]];
        let samples: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let fit = KMeans::new(10, KMeansSettings::default()).fit(&samples).unwrap();
        assert_eq!(fit.k(), 2);
    }

    #[test]
    fn test_identical_samples() {
        let data = vec![vec![1.0f32, 1.0]; 5];
        let samples: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let fit = KMeans::new(3, KMeansSettings::default()).fit(&samples).unwrap();
        assert_eq!(fit.k(), 3);
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn test_fit_without_samples_fails() {
        let samples: Vec<&[f32]> = Vec::new();
        assert!(matches!(
            KMeans::new(3, KMeansSettings::default()).fit(&samples),
            Err(ThumbnailError::GenerationFailure(_))
        ));
    }

    #[test]
    fn test_medoids_are_real_samples() {
        let data = blobs();
        let samples: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let result = cluster_images(&samples, 3, 2, &KMeansSettings::default()).unwrap();
        assert_eq!(result.centroids.len(), 3);
        for medoid in &result.medoids {
            assert!(data.contains(medoid));
        }
    }

    #[test]
    fn test_few_samples_are_padded() {
        let data = vec![vec![1.0f32, 2.0], vec![3.0, 4.0]];
        let samples: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let result = cluster_images(&samples, 10, 2, &KMeansSettings::default()).unwrap();
        assert_eq!(result.centroids, vec![vec![0.0, 0.0], vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(result.medoids, result.centroids);
    }

    #[test]
    fn test_no_samples_pad_to_three_zero_images() {
        let samples: Vec<&[f32]> = Vec::new();
        let result = cluster_images(&samples, 3, 4, &KMeansSettings::default()).unwrap();
        assert_eq!(result.centroids, vec![vec![0.0; 4]; 3]);
    }
}
