//! Named thumbnail strategies.
//!
//! A closed set of pipelines, each a pure function of the candidate images,
//! the validity mask and the k-means settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::algorithm::compose::{compose_image_channels, compose_pixel_clusters, PixelIntensity};
use crate::algorithm::filter::CandidateFilter;
use crate::algorithm::kmeans::{cluster_images, ClusterResult, KMeansSettings, NUM_REPRESENTATIVES};
use crate::algorithm::overlap::{pick_least_overlapping, MAX_POOL_SIZE};
use crate::data::ion_image::{CandidateSet, ValidityMask};
use crate::data::thumbnail::Thumbnail;
use crate::error::{Result, ThumbnailError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    SmartImageMedoid,
    SmartImageCentroid,
    ImageMedoid,
    ImageCentroid,
    PixelMeanIntensity,
    PixelDistance,
}

/// Registry of every strategy by name.
pub const STRATEGIES: [(&str, Strategy); 6] = [
    ("smart-image-medoid", Strategy::SmartImageMedoid),
    ("smart-image-centroid", Strategy::SmartImageCentroid),
    ("image-medoid", Strategy::ImageMedoid),
    ("image-centroid", Strategy::ImageCentroid),
    ("pixel-mean-intensity", Strategy::PixelMeanIntensity),
    ("pixel-distance", Strategy::PixelDistance),
];

pub const DEFAULT_STRATEGY: Strategy = Strategy::ImageCentroid;

/// Which cluster representative an image strategy shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representative {
    /// Averaged cluster center, smoother.
    Centroid,
    /// Nearest real image to the center, sharper.
    Medoid,
}

impl Default for Strategy {
    fn default() -> Self {
        DEFAULT_STRATEGY
    }
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        STRATEGIES
            .iter()
            .find(|(_, s)| s == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        STRATEGIES.iter().map(|(name, _)| *name)
    }

    /// Run the strategy's pipeline.
    pub fn render(
        &self,
        candidates: &CandidateSet,
        mask: &ValidityMask,
        settings: &KMeansSettings,
    ) -> Result<Thumbnail> {
        candidates.validate_against(mask)?;
        match *self {
            Strategy::SmartImageMedoid => smart_image_thumbnail(candidates, mask, Representative::Medoid, settings),
            Strategy::SmartImageCentroid => smart_image_thumbnail(candidates, mask, Representative::Centroid, settings),
            Strategy::ImageMedoid => image_thumbnail(candidates, mask, Representative::Medoid, settings),
            Strategy::ImageCentroid => image_thumbnail(candidates, mask, Representative::Centroid, settings),
            Strategy::PixelMeanIntensity => pixel_thumbnail(candidates, mask, PixelIntensity::MeanIntensity, settings),
            Strategy::PixelDistance => pixel_thumbnail(candidates, mask, PixelIntensity::DistanceFromCentroid, settings),
        }
    }
}

impl FromStr for Strategy {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self> {
        STRATEGIES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, strategy)| *strategy)
            .ok_or_else(|| ThumbnailError::UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn pick(clusters: ClusterResult, representative: Representative) -> Vec<Vec<f32>> {
    match representative {
        Representative::Centroid => clusters.centroids,
        Representative::Medoid => clusters.medoids,
    }
}

/// Cluster into a pool of up to ten, keep the least overlapping three.
pub fn smart_image_thumbnail(
    candidates: &CandidateSet,
    mask: &ValidityMask,
    representative: Representative,
    settings: &KMeansSettings,
) -> Result<Thumbnail> {
    let good = CandidateFilter::default().filter(candidates, mask);
    let k = MAX_POOL_SIZE.min(good.len());
    let pool = cluster_images(&good, k, candidates.n_pixels(), settings)?;

    let chosen = if pool.centroids.len() > NUM_REPRESENTATIVES {
        let centroids: Vec<&[f32]> = pool.centroids.iter().map(|c| c.as_slice()).collect();
        let idxs = pick_least_overlapping(&centroids, mask, NUM_REPRESENTATIVES)?;
        pool.select(&idxs)
    } else {
        pool
    };

    compose_image_channels(pick(chosen, representative), mask)
}

/// Cluster straight into three groups.
pub fn image_thumbnail(
    candidates: &CandidateSet,
    mask: &ValidityMask,
    representative: Representative,
    settings: &KMeansSettings,
) -> Result<Thumbnail> {
    let good = CandidateFilter::default().filter(candidates, mask);
    let clusters = cluster_images(&good, NUM_REPRESENTATIVES, candidates.n_pixels(), settings)?;
    compose_image_channels(pick(clusters, representative), mask)
}

/// Cluster pixels by intensity profile across the filtered images.
pub fn pixel_thumbnail(
    candidates: &CandidateSet,
    mask: &ValidityMask,
    intensity: PixelIntensity,
    settings: &KMeansSettings,
) -> Result<Thumbnail> {
    let good = CandidateFilter::default().filter(candidates, mask);
    compose_pixel_clusters(&good, mask, intensity, settings)
}
