//! Preparation of decoded ion images for thumbnail analysis.
//!
//! Images are shrunk to fit a maximum size, masked, and hotspot-clipped so
//! intensities are comparable across molecules.

use statrs::statistics::{Data, OrderStatistics};

/// Ion image as decoded from storage.
#[derive(Clone, Debug, PartialEq)]
pub struct IonImage {
    pub height: usize,
    pub width: usize,
    pub intensities: Vec<f32>,
    /// Per-pixel validity from the alpha channel, if the image has one.
    pub alpha: Option<Vec<bool>>,
}

impl IonImage {
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Shape that fits inside `max_size` with the aspect ratio kept. Never upscales.
pub fn fit_within(height: usize, width: usize, max_size: (usize, usize)) -> (usize, usize) {
    let (max_h, max_w) = (max_size.0.max(1), max_size.1.max(1));
    if height <= max_h && width <= max_w {
        return (height, width);
    }
    let scale = (height as f64 / max_h as f64).max(width as f64 / max_w as f64);
    let new_h = ((height as f64 / scale).round() as usize).clamp(1, max_h);
    let new_w = ((width as f64 / scale).round() as usize).clamp(1, max_w);
    (new_h, new_w)
}

/// Nearest-neighbour resample of a row-major grid, sampling pixel centers.
pub fn resize_nearest<T: Copy>(data: &[T], height: usize, width: usize, new_h: usize, new_w: usize) -> Vec<T> {
    if (height, width) == (new_h, new_w) {
        return data.to_vec();
    }
    let sy = height as f64 / new_h as f64;
    let sx = width as f64 / new_w as f64;
    let mut out = Vec::with_capacity(new_h * new_w);
    for y in 0..new_h {
        let src_y = (((y as f64 + 0.5) * sy) as usize).min(height - 1);
        for x in 0..new_w {
            let src_x = (((x as f64 + 0.5) * sx) as usize).min(width - 1);
            out.push(data[src_y * width + src_x]);
        }
    }
    out
}

/// Clip intensities at the given percentile of positive in-mask values and
/// scale to `[0, 1]`. Pixels outside the mask are zeroed.
pub fn hotspot_normalize(values: &mut [f32], mask: &[bool], percentile: usize) {
    for (v, &m) in values.iter_mut().zip(mask.iter()) {
        if !m || !v.is_finite() || *v < 0.0 {
            *v = 0.0;
        }
    }

    let positive: Vec<f64> = values.iter().filter(|&&v| v > 0.0).map(|&v| v as f64).collect();
    if positive.is_empty() {
        return;
    }
    let max = positive.iter().cloned().fold(0.0f64, f64::max);
    let mut data = Data::new(positive);
    let mut clip = data.percentile(percentile.min(100));
    if !(clip > 0.0) {
        clip = max;
    }

    let clip = clip as f32;
    for v in values.iter_mut() {
        *v = v.min(clip) / clip;
    }
}

/// Resize an image and its mask to `shape` and normalize it for analysis.
pub fn prepare_for_analysis(
    image: &IonImage,
    mask: &[bool],
    shape: (usize, usize),
    hotspot_percentile: usize,
) -> Vec<f32> {
    let mut values = resize_nearest(&image.intensities, image.height, image.width, shape.0, shape.1);
    hotspot_normalize(&mut values, mask, hotspot_percentile);
    values
}
