//! Image descriptors from raw interleaved samples, for encoding.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::debug;

use crate::codec::EncoderParameters;
use crate::image::{Image, ImageComponent};
use crate::types::{ColorSpace, Endianness};
use crate::{Jpeg2000Error, Result};

/// Precision below this is raised to it.
pub const MIN_PRECISION: u32 = 8;

/// Highest precision a raw sample can carry (two bytes).
pub const MAX_PRECISION: u32 = 16;

/// Layout of a raw interleaved sample buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawImageParams {
    pub width: u32,
    pub height: u32,
    pub num_components: usize,
    /// Bits per sample.
    pub precision: u32,
    pub signed: bool,
    /// Byte order of two-byte samples.
    pub endianness: Endianness,
}

impl RawImageParams {
    /// Unsigned 8-bit samples.
    pub fn new(width: u32, height: u32, num_components: usize) -> Self {
        Self {
            width,
            height,
            num_components,
            precision: 8,
            signed: false,
            endianness: Endianness::Big,
        }
    }

    /// Set bits per sample.
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Mark samples as signed.
    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Set the byte order of two-byte samples.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Precision after applying the 8-bit floor.
    pub fn effective_precision(&self) -> u32 {
        self.precision.max(MIN_PRECISION)
    }

    /// Bytes per sample for the effective precision.
    pub fn bytes_per_sample(&self) -> usize {
        if self.effective_precision() <= 8 {
            1
        } else {
            2
        }
    }

    /// Bytes needed for a full buffer, or `None` if that overflows `usize`.
    pub fn buffer_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.num_components)?
            .checked_mul(self.bytes_per_sample())
    }
}

/// Build an image descriptor, with sample data, from interleaved raw samples.
///
/// Every component gets the subsampling and image offset of `encoder`.
/// Fewer than three components are tagged grayscale, otherwise sRGB.
pub fn image_from_raw(data: &[u8], raw: &RawImageParams, encoder: &EncoderParameters) -> Result<Image> {
    if raw.width == 0 || raw.height == 0 {
        return Err(Jpeg2000Error::InvalidDimensions {
            width: raw.width,
            height: raw.height,
        });
    }
    if raw.num_components == 0 {
        return Err(Jpeg2000Error::UnsupportedComponentCount(0));
    }
    let precision = raw.effective_precision();
    if precision > MAX_PRECISION {
        return Err(Jpeg2000Error::UnsupportedBitDepth(precision));
    }
    let (dx, dy) = (encoder.subsampling_dx, encoder.subsampling_dy);
    if dx == 0 || dy == 0 {
        return Err(Jpeg2000Error::InvalidInput(format!("subsampling {dx}x{dy}")));
    }
    let invalid_dimensions = || Jpeg2000Error::InvalidDimensions {
        width: raw.width,
        height: raw.height,
    };
    let needed = raw.buffer_size().ok_or_else(invalid_dimensions)?;
    if data.len() < needed {
        return Err(Jpeg2000Error::BufferTooSmall {
            needed,
            available: data.len(),
        });
    }

    let x0 = encoder.image_offset_x0;
    let y0 = encoder.image_offset_y0;
    let x1 = grid_end(x0, raw.width, dx).ok_or_else(invalid_dimensions)?;
    let y1 = grid_end(y0, raw.height, dy).ok_or_else(invalid_dimensions)?;
    let color_space = if raw.num_components < 3 {
        ColorSpace::Grayscale
    } else {
        ColorSpace::Srgb
    };

    let mut image = Image::new(x0, y0, x1, y1, color_space);
    let pixels = raw.width as usize * raw.height as usize;
    for _ in 0..raw.num_components {
        let mut comp = ImageComponent::on_grid((x0, y0, x1, y1), dx, dy, precision, raw.signed);
        comp.data = Vec::with_capacity(pixels);
        image.components.push(comp);
    }

    let sample_size = raw.bytes_per_sample();
    let pixel_size = sample_size * raw.num_components;
    for pixel in data[..needed].chunks_exact(pixel_size) {
        for (comp, sample) in image.components.iter_mut().zip(pixel.chunks_exact(sample_size)) {
            comp.data.push(read_sample(sample, raw.signed, raw.endianness));
        }
    }

    debug!(
        width = raw.width,
        height = raw.height,
        components = raw.num_components,
        precision,
        "built image from raw samples"
    );
    Ok(image)
}

/// Exclusive end on the reference grid of `samples` samples spaced `step` apart.
fn grid_end(origin: u32, samples: u32, step: u32) -> Option<u32> {
    (samples - 1).checked_mul(step)?.checked_add(origin)?.checked_add(1)
}

fn read_sample(bytes: &[u8], signed: bool, endianness: Endianness) -> i32 {
    match (bytes.len(), signed, endianness) {
        (1, false, _) => bytes[0] as i32,
        (1, true, _) => bytes[0] as i8 as i32,
        (_, false, Endianness::Big) => BigEndian::read_u16(bytes) as i32,
        (_, false, Endianness::Little) => LittleEndian::read_u16(bytes) as i32,
        (_, true, Endianness::Big) => BigEndian::read_i16(bytes) as i32,
        (_, true, Endianness::Little) => LittleEndian::read_i16(bytes) as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_interleaved() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let image = image_from_raw(&data, &RawImageParams::new(2, 1, 3), &EncoderParameters::default()).unwrap();
        assert_eq!(image.color_space, ColorSpace::Srgb);
        assert_eq!((image.x1, image.y1), (2, 1));
        assert_eq!(image.components[0].data, vec![1, 4]);
        assert_eq!(image.components[2].data, vec![3, 6]);
        assert!(image.is_consistent());
    }

    #[test]
    fn test_two_components_is_gray() {
        let data = [0u8; 8];
        let image = image_from_raw(&data, &RawImageParams::new(2, 2, 2), &EncoderParameters::default()).unwrap();
        assert_eq!(image.color_space, ColorSpace::Grayscale);
        assert_eq!(image.num_components(), 2);
    }

    #[test]
    fn test_precision_floor() {
        let data = [0u8; 4];
        let raw = RawImageParams::new(2, 2, 1).with_precision(4);
        let image = image_from_raw(&data, &raw, &EncoderParameters::default()).unwrap();
        assert_eq!(image.components[0].precision, 8);
        assert_eq!(raw.bytes_per_sample(), 1);
    }

    #[test]
    fn test_sixteen_bit_endianness() {
        let big = image_from_raw(
            &[0x01, 0x02],
            &RawImageParams::new(1, 1, 1).with_precision(12),
            &EncoderParameters::default(),
        )
        .unwrap();
        assert_eq!(big.components[0].data, vec![0x0102]);

        let little = image_from_raw(
            &[0x01, 0x02],
            &RawImageParams::new(1, 1, 1)
                .with_precision(12)
                .with_endianness(Endianness::Little),
            &EncoderParameters::default(),
        )
        .unwrap();
        assert_eq!(little.components[0].data, vec![0x0201]);
    }

    #[test]
    fn test_signed_samples() {
        let raw = RawImageParams::new(2, 1, 1).with_signed(true);
        let image = image_from_raw(&[0xFF, 0x7F], &raw, &EncoderParameters::default()).unwrap();
        assert_eq!(image.components[0].data, vec![-1, 127]);
        assert!(image.components[0].signed);
    }

    #[test]
    fn test_subsampling_and_offset() {
        let params = EncoderParameters {
            subsampling_dx: 2,
            subsampling_dy: 2,
            image_offset_x0: 4,
            image_offset_y0: 2,
            ..EncoderParameters::default()
        };
        let image = image_from_raw(&[0u8; 6], &RawImageParams::new(3, 2, 1), &params).unwrap();
        assert_eq!((image.x0, image.y0, image.x1, image.y1), (4, 2, 9, 5));
        let comp = &image.components[0];
        assert_eq!((comp.dx, comp.width, comp.height), (2, 3, 2));
    }

    #[test]
    fn test_rejects_bad_input() {
        let params = EncoderParameters::default();
        assert!(matches!(
            image_from_raw(&[0], &RawImageParams::new(0, 1, 1), &params),
            Err(Jpeg2000Error::InvalidDimensions { width: 0, height: 1 })
        ));
        assert!(matches!(
            image_from_raw(&[0], &RawImageParams::new(1, 1, 0), &params),
            Err(Jpeg2000Error::UnsupportedComponentCount(0))
        ));
        assert!(matches!(
            image_from_raw(&[0; 4], &RawImageParams::new(1, 1, 1).with_precision(24), &params),
            Err(Jpeg2000Error::UnsupportedBitDepth(24))
        ));
        assert!(matches!(
            image_from_raw(&[0; 5], &RawImageParams::new(2, 1, 3), &params),
            Err(Jpeg2000Error::BufferTooSmall { needed: 6, available: 5 })
        ));
    }

    #[test]
    fn test_buffer_size_overflow() {
        assert_eq!(RawImageParams::new(2, 3, 3).with_precision(12).buffer_size(), Some(36));

        let raw = RawImageParams::new(1, 1, usize::MAX).with_precision(12);
        assert_eq!(raw.buffer_size(), None);
        assert!(matches!(
            image_from_raw(&[0; 2], &raw, &EncoderParameters::default()),
            Err(Jpeg2000Error::InvalidDimensions { width: 1, height: 1 })
        ));
    }

    #[test]
    fn test_grid_overflow_is_rejected() {
        let params = EncoderParameters {
            image_offset_x0: u32::MAX,
            ..EncoderParameters::default()
        };
        assert!(matches!(
            image_from_raw(&[0], &RawImageParams::new(1, 1, 1), &params),
            Err(Jpeg2000Error::InvalidDimensions { width: 1, height: 1 })
        ));

        let params = EncoderParameters {
            subsampling_dy: u32::MAX,
            ..EncoderParameters::default()
        };
        assert!(matches!(
            image_from_raw(&[0; 3], &RawImageParams::new(1, 3, 1), &params),
            Err(Jpeg2000Error::InvalidDimensions { width: 1, height: 3 })
        ));
    }

    #[test]
    fn test_grid_at_the_edge() {
        let params = EncoderParameters {
            image_offset_x0: u32::MAX - 2,
            ..EncoderParameters::default()
        };
        let image = image_from_raw(&[7, 8], &RawImageParams::new(2, 1, 1), &params).unwrap();
        assert_eq!((image.x0, image.x1), (u32::MAX - 2, u32::MAX));
        assert_eq!(image.components[0].width, 2);
        assert_eq!(image.components[0].data, vec![7, 8]);
    }
}
