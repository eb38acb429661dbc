use std::io::Cursor;

use ioncore::data::thumbnail::Thumbnail;
use ioncore::error::BoxError;
use ioncore::generate::RasterEncoder;

use crate::data::analysis::IonImage;
use crate::error::StoreError;

/// Encode a thumbnail as an 8-bit RGBA PNG with maximum compression.
pub fn encode_thumbnail(thumbnail: &Thumbnail) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, thumbnail.width as u32, thumbnail.height as u32);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Best);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&thumbnail.data)?;
        writer.finish()?;
    }
    Ok(out)
}

/// Encode a 16-bit grayscale ion image, with the mask as alpha when given.
pub fn encode_ion_image(
    height: usize,
    width: usize,
    intensities: &[u16],
    mask: Option<&[bool]>,
) -> Result<Vec<u8>, StoreError> {
    let mut data = Vec::with_capacity(intensities.len() * 4);
    let color = match mask {
        Some(mask) => {
            for (&v, &m) in intensities.iter().zip(mask.iter()) {
                data.extend_from_slice(&v.to_be_bytes());
                data.extend_from_slice(&(if m { u16::MAX } else { 0 }).to_be_bytes());
            }
            png::ColorType::GrayscaleAlpha
        }
        None => {
            for &v in intensities {
                data.extend_from_slice(&v.to_be_bytes());
            }
            png::ColorType::Grayscale
        }
    };

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width as u32, height as u32);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Sixteen);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&data)?;
        writer.finish()?;
    }
    Ok(out)
}

/// Decode a grayscale ion image (8 or 16 bit, optional alpha).
pub fn decode_ion_image(bytes: &[u8]) -> Result<IonImage, StoreError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let raw = &buf[..info.buffer_size()];

    let samples: Vec<f32> = match info.bit_depth {
        png::BitDepth::Eight => raw.iter().map(|&b| b as f32).collect(),
        png::BitDepth::Sixteen => raw
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]) as f32)
            .collect(),
        depth => return Err(StoreError::UnsupportedPng { color: info.color_type, depth }),
    };

    let (intensities, alpha) = match info.color_type {
        png::ColorType::Grayscale => (samples, None),
        png::ColorType::GrayscaleAlpha => {
            let intensities = samples.iter().step_by(2).copied().collect();
            let alpha = samples.iter().skip(1).step_by(2).map(|&a| a > 0.0).collect();
            (intensities, Some(alpha))
        }
        color => {
            return Err(StoreError::UnsupportedPng { color, depth: info.bit_depth });
        }
    };

    Ok(IonImage {
        height: info.height as usize,
        width: info.width as usize,
        intensities,
        alpha,
    })
}

/// PNG codec for the thumbnail generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngEncoder;

impl RasterEncoder for PngEncoder {
    fn encode(&self, thumbnail: &Thumbnail) -> Result<Vec<u8>, BoxError> {
        encode_thumbnail(thumbnail).map_err(StoreError::into_boxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ion_image_with_mask() {
        let bytes = encode_ion_image(2, 2, &[0, 100, 200, 65535], Some(&[true, true, false, true])).unwrap();
        let image = decode_ion_image(&bytes).unwrap();
        assert_eq!(image.shape(), (2, 2));
        assert_eq!(image.intensities, vec![0.0, 100.0, 200.0, 65535.0]);
        assert_eq!(image.alpha, Some(vec![true, true, false, true]));
    }

    #[test]
    fn test_thumbnail_png_header() {
        let thumbnail = Thumbnail { height: 2, width: 3, data: vec![7; 2 * 3 * 4] };
        let bytes = encode_thumbnail(&thumbnail).unwrap();
        assert_eq!(&bytes[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);

        let decoder = png::Decoder::new(Cursor::new(bytes.as_slice()));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        assert_eq!(info.color_type, png::ColorType::Rgba);
        assert_eq!(&buf[..info.buffer_size()], thumbnail.data.as_slice());
    }

    #[test]
    fn test_rgb_is_rejected() {
        let thumbnail = Thumbnail { height: 1, width: 1, data: vec![1, 2, 3, 4] };
        let bytes = encode_thumbnail(&thumbnail).unwrap();
        assert!(matches!(decode_ion_image(&bytes), Err(StoreError::UnsupportedPng { .. })));
    }
}
