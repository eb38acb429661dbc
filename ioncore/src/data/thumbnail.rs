use crate::data::ion_image::ValidityMask;
use crate::error::{Result, ThumbnailError};

pub const CHANNELS: usize = 4;

/// 8-bit RGBA raster, row-major, `height * width * 4` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub height: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl Thumbnail {
    /// Build a raster from float channel planes in `[0, 1]` plus the mask as alpha.
    ///
    /// Color values are scaled by 255, clipped and truncated to `u8`;
    /// alpha is 255 for valid pixels and 0 otherwise.
    pub fn from_planes(planes: [&[f32]; 3], mask: &ValidityMask) -> Result<Self> {
        let (height, width) = mask.shape();
        let n = height * width;
        for plane in planes.iter() {
            if plane.len() != n {
                return Err(ThumbnailError::PixelCountMismatch {
                    shape: (height, width),
                    expected: n,
                    got: plane.len(),
                });
            }
        }

        let mut data = Vec::with_capacity(n * CHANNELS);
        for i in 0..n {
            for plane in planes.iter() {
                data.push(to_u8(plane[i]));
            }
            data.push(if mask.pixels[i] { 255 } else { 0 });
        }
        Ok(Thumbnail { height, width, data })
    }

    /// Raster shape as `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, CHANNELS)
    }

    #[inline]
    pub fn pixel(&self, y: usize, x: usize) -> [u8; 4] {
        let o = (y * self.width + x) * CHANNELS;
        [self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]]
    }

    /// One channel as a flat row-major plane.
    pub fn channel(&self, c: usize) -> Vec<u8> {
        self.data.iter().skip(c).step_by(CHANNELS).copied().collect()
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    // NaN maps to 0 through the saturating cast
    (v * 255.0).clamp(0.0, 255.0) as u8
}
