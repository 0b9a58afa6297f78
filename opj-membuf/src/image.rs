//! Decoded image model and sample export.

use crate::types::ColorSpace;
use crate::{Jpeg2000Error, Result};

/// One image component: an independent 2-D sample plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageComponent {
    /// Horizontal subsampling factor.
    pub dx: u32,
    /// Vertical subsampling factor.
    pub dy: u32,
    /// Width in samples.
    pub width: u32,
    /// Height in samples.
    pub height: u32,
    /// Horizontal offset on the component grid.
    pub x0: u32,
    /// Vertical offset on the component grid.
    pub y0: u32,
    /// Bits per sample.
    pub precision: u32,
    /// Signed samples.
    pub signed: bool,
    /// Resolution levels discarded by the decoder.
    pub factor: u32,
    /// Component is an alpha channel.
    pub alpha: bool,
    /// Row-major samples; empty until decoded.
    pub data: Vec<i32>,
}

impl ImageComponent {
    /// Build a component laid out on the reference grid `[x0, x1) x [y0, y1)`
    /// with the given subsampling. Inverted bounds give an empty plane.
    ///
    /// # Panics
    ///
    /// Panics if `dx` or `dy` is zero.
    pub fn on_grid(bounds: (u32, u32, u32, u32), dx: u32, dy: u32, precision: u32, signed: bool) -> Self {
        let (x0, y0, x1, y1) = bounds;
        let cx0 = x0.div_ceil(dx);
        let cy0 = y0.div_ceil(dy);
        Self {
            dx,
            dy,
            width: x1.div_ceil(dx).saturating_sub(cx0),
            height: y1.div_ceil(dy).saturating_sub(cy0),
            x0: cx0,
            y0: cy0,
            precision,
            signed,
            factor: 0,
            alpha: false,
            data: Vec::new(),
        }
    }

    /// Number of samples in the plane.
    pub fn num_samples(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Largest representable unsigned sample value.
    pub fn max_value(&self) -> i32 {
        ((1i64 << self.precision.min(31)) - 1) as i32
    }

    /// Same sample grid (subsampling and size) as `other`.
    pub fn same_layout(&self, other: &ImageComponent) -> bool {
        self.dx == other.dx
            && self.dy == other.dy
            && self.width == other.width
            && self.height == other.height
    }

    /// Allocate a zeroed plane if none is present.
    pub fn alloc(&mut self) {
        if self.data.len() != self.num_samples() {
            self.data = vec![0; self.num_samples()];
        }
    }
}

/// Image as handed over by the codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Left edge of the image area on the reference grid.
    pub x0: u32,
    /// Top edge of the image area on the reference grid.
    pub y0: u32,
    /// Right edge (exclusive).
    pub x1: u32,
    /// Bottom edge (exclusive).
    pub y1: u32,
    /// Color space tag.
    pub color_space: ColorSpace,
    /// Components in codestream order.
    pub components: Vec<ImageComponent>,
    /// Embedded ICC profile.
    pub icc_profile: Option<Vec<u8>>,
}

impl Image {
    /// Create an image descriptor with no components.
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32, color_space: ColorSpace) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            color_space,
            components: Vec::new(),
            icc_profile: None,
        }
    }

    /// Image area width on the reference grid.
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// Image area height on the reference grid.
    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// Number of components.
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Check if image is grayscale.
    pub fn is_grayscale(&self) -> bool {
        self.color_space == ColorSpace::Grayscale || self.components.len() == 1
    }

    /// Check that every component sits on the image grid according to its
    /// subsampling and resolution factor.
    pub fn is_consistent(&self) -> bool {
        self.components.iter().all(|c| {
            if c.dx == 0 || c.dy == 0 {
                return false;
            }
            let scale = 1u64 << c.factor.min(31);
            let reduce = |lo: u32, hi: u32, d: u32| {
                let lo = (lo as u64).div_ceil(d as u64).div_ceil(scale);
                let hi = (hi as u64).div_ceil(d as u64).div_ceil(scale);
                hi - lo
            };
            reduce(self.x0, self.x1, c.dx) == c.width as u64
                && reduce(self.y0, self.y1, c.dy) == c.height as u64
        })
    }

    /// Convert to 8-bit interleaved RGB.
    pub fn to_rgb_bytes(&self) -> Result<Vec<u8>> {
        if self.components.len() < 3 {
            return Err(Jpeg2000Error::UnsupportedComponentCount(self.components.len()));
        }
        let planes = self.matching_planes(3)?;
        Ok(interleave_u8(&planes))
    }

    /// Convert to 8-bit interleaved RGBA.
    ///
    /// Gray images are replicated across the color channels; a missing alpha
    /// channel is filled with full opacity.
    pub fn to_rgba_bytes(&self) -> Result<Vec<u8>> {
        let count = self.components.len();
        if count == 0 {
            return Err(Jpeg2000Error::UnsupportedComponentCount(0));
        }
        let planes = self.matching_planes(count.min(4))?;
        let (color, alpha) = match planes.len() {
            1 => (vec![planes[0]; 3], None),
            2 => (vec![planes[0]; 3], Some(planes[1])),
            3 => (planes.clone(), None),
            _ => (planes[..3].to_vec(), Some(planes[3])),
        };

        let pixels = planes[0].num_samples();
        let mut rgba = Vec::with_capacity(pixels * 4);
        for i in 0..pixels {
            for plane in &color {
                rgba.push(to_u8(plane.data[i], plane.precision, plane.signed));
            }
            rgba.push(alpha.map_or(255, |a| to_u8(a.data[i], a.precision, a.signed)));
        }
        Ok(rgba)
    }

    /// Convert the first component to 8-bit grayscale.
    pub fn to_gray_bytes(&self) -> Result<Vec<u8>> {
        let comp = self
            .components
            .first()
            .ok_or(Jpeg2000Error::UnsupportedComponentCount(0))?;
        if comp.data.len() < comp.num_samples() {
            return Err(Jpeg2000Error::BufferTooSmall {
                needed: comp.num_samples(),
                available: comp.data.len(),
            });
        }
        Ok(comp.data[..comp.num_samples()]
            .iter()
            .map(|&v| to_u8(v, comp.precision, comp.signed))
            .collect())
    }

    /// Export native-precision samples interleaved per pixel.
    ///
    /// Supports 1, 3 and 4 component images whose components share one
    /// sample grid; other layouts need colorspace conversion first.
    pub fn to_interleaved(&self) -> Result<InterleavedSamples> {
        let channels = self.components.len();
        if !matches!(channels, 1 | 3 | 4) {
            return Err(Jpeg2000Error::UnsupportedComponentCount(channels));
        }
        let planes = self.matching_planes(channels)?;
        let first = planes[0];
        let pixels = first.num_samples();

        let mut samples = Vec::with_capacity(pixels * channels);
        for i in 0..pixels {
            samples.extend(planes.iter().map(|p| p.data[i]));
        }

        Ok(InterleavedSamples {
            width: first.width,
            height: first.height,
            channels,
            precision: first.precision,
            samples,
        })
    }

    /// First `count` components, checked to share the first one's layout and
    /// to carry decoded data.
    fn matching_planes(&self, count: usize) -> Result<Vec<&ImageComponent>> {
        let planes: Vec<&ImageComponent> = self.components.iter().take(count).collect();
        let first = planes[0];
        for plane in &planes {
            if !plane.same_layout(first) {
                return Err(Jpeg2000Error::InvalidDimensions {
                    width: plane.width,
                    height: plane.height,
                });
            }
            if plane.data.len() < first.num_samples() {
                return Err(Jpeg2000Error::BufferTooSmall {
                    needed: first.num_samples(),
                    available: plane.data.len(),
                });
            }
        }
        Ok(planes)
    }
}

/// Samples of all components interleaved per pixel, at native precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedSamples {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Samples per pixel.
    pub channels: usize,
    /// Bits per sample of the first component.
    pub precision: u32,
    /// `width * height * channels` samples.
    pub samples: Vec<i32>,
}

impl InterleavedSamples {
    /// Samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[i32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.channels;
        self.samples.get(start..start + self.channels)
    }
}

fn interleave_u8(planes: &[&ImageComponent]) -> Vec<u8> {
    let pixels = planes[0].num_samples();
    let mut out = Vec::with_capacity(pixels * planes.len());
    for i in 0..pixels {
        for plane in planes {
            out.push(to_u8(plane.data[i], plane.precision, plane.signed));
        }
    }
    out
}

/// Normalize a sample of the given precision to 8 bits.
fn to_u8(val: i32, precision: u32, signed: bool) -> u8 {
    let precision = precision.clamp(1, 31);
    let max = (1i64 << precision) - 1;
    let mut v = val as i64;
    if signed {
        v += 1i64 << (precision - 1);
    }
    let v = v.clamp(0, max);

    if precision > 8 {
        (v >> (precision - 8)) as u8
    } else if precision < 8 {
        ((v * 255) / max) as u8
    } else {
        v as u8
    }
}
