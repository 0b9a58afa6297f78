//! Post-decode colorspace normalization.
//!
//! Conversions mutate the image in place. A conversion whose preconditions
//! do not hold (component count, subsampling layout) returns
//! [`Jpeg2000Error::ColorConversion`] and leaves the image untouched.

use tracing::{debug, trace};

use crate::image::{Image, ImageComponent};
use crate::types::{ColorSpace, OutputFormat};
use crate::{Jpeg2000Error, Result};

/// Fix up ambiguous color space tags from the codestream.
///
/// Three components with a square-sampled first component and a
/// horizontally subsampled second one are luma/chroma; one or two
/// components are grayscale.
pub fn reclassify(image: &mut Image) {
    let comps = &image.components;
    if image.color_space != ColorSpace::YCbCr
        && comps.len() == 3
        && comps[0].dx == comps[0].dy
        && comps[1].dx != 1
    {
        trace!(from = ?image.color_space, "reclassifying as sYCC");
        image.color_space = ColorSpace::YCbCr;
    } else if comps.len() <= 2 {
        image.color_space = ColorSpace::Grayscale;
    }
}

/// Reclassify, then convert to RGB where the color space calls for it.
///
/// CMYK images destined for TIFF keep their four channels.
pub fn convert_for_output(image: &mut Image, output: OutputFormat) -> Result<()> {
    reclassify(image);
    match image.color_space {
        ColorSpace::YCbCr => sycc_to_rgb(image),
        ColorSpace::Cmyk if output != OutputFormat::Tif => cmyk_to_rgb(image),
        ColorSpace::ExtendedYCbCr => esycc_to_rgb(image),
        _ => Ok(()),
    }
}

/// Convert sYCC (4:4:4, 4:2:2 or 4:2:0) to RGB.
///
/// Chroma planes are upsampled to the luma grid. Images with fewer than
/// three components are retagged grayscale.
pub fn sycc_to_rgb(image: &mut Image) -> Result<()> {
    if image.components.len() < 3 {
        image.color_space = ColorSpace::Grayscale;
        return Ok(());
    }

    let (luma, cb, cr) = (&image.components[0], &image.components[1], &image.components[2]);
    let (dx, dy) = match ((luma.dx, luma.dy), (cb.dx, cb.dy), (cr.dx, cr.dy)) {
        ((1, 1), (2, 2), (2, 2)) => (2, 2),
        ((1, 1), (2, 1), (2, 1)) => (2, 1),
        ((1, 1), (1, 1), (1, 1)) => (1, 1),
        _ => {
            return Err(Jpeg2000Error::ColorConversion(format!(
                "unsupported sYCC subsampling {}x{}/{}x{}/{}x{}",
                luma.dx, luma.dy, cb.dx, cb.dy, cr.dx, cr.dy
            )))
        }
    };
    check_planes(&[luma])?;
    check_planes(&[cb, cr])?;
    if cb.width != cr.width || cb.height != cr.height || cb.num_samples() == 0 {
        return Err(Jpeg2000Error::ColorConversion("chroma planes differ in size".into()));
    }
    let precision = checked_precision(luma)?;

    let offset = 1i64 << (precision - 1);
    let upb = (1i64 << precision) - 1;
    let (w, h) = (luma.width as usize, luma.height as usize);
    let (cw, ch) = (cb.width as usize, cb.height as usize);
    // An odd image origin leaves the first luma column/row without a partner.
    let offx = (image.x0 % dx) as usize;
    let offy = (image.y0 % dy) as usize;

    let mut r = Vec::with_capacity(w * h);
    let mut g = Vec::with_capacity(w * h);
    let mut b = Vec::with_capacity(w * h);
    for row in 0..h {
        let cy = ((row + offy) / dy as usize).min(ch - 1);
        for col in 0..w {
            let cx = ((col + offx) / dx as usize).min(cw - 1);
            let ci = cy * cw + cx;
            let (pr, pg, pb) = sycc_pixel(offset, upb, luma.data[row * w + col], cb.data[ci], cr.data[ci]);
            r.push(pr);
            g.push(pg);
            b.push(pb);
        }
    }

    debug!(dx, dy, width = w, height = h, "converted sYCC to RGB");
    let template = image.components[0].clone();
    image.components[0].data = r;
    for (comp, data) in image.components[1..3].iter_mut().zip([g, b]) {
        adopt_layout(comp, &template);
        comp.data = data;
    }
    image.color_space = ColorSpace::Srgb;
    Ok(())
}

fn sycc_pixel(offset: i64, upb: i64, y: i32, cb: i32, cr: i32) -> (i32, i32, i32) {
    // Widened so out-of-range samples clamp instead of overflowing.
    let y = y as i64;
    let cb = (cb as i64 - offset) as f64;
    let cr = (cr as i64 - offset) as f64;
    let r = y + (1.402 * cr) as i64;
    let g = y - (0.344 * cb + 0.714 * cr) as i64;
    let b = y + (1.772 * cb) as i64;
    (
        r.clamp(0, upb) as i32,
        g.clamp(0, upb) as i32,
        b.clamp(0, upb) as i32,
    )
}

/// Convert CMYK to 8-bit RGB, dropping the K component.
///
/// Components after the fourth (e.g. alpha) are kept and shift down.
pub fn cmyk_to_rgb(image: &mut Image) -> Result<()> {
    if image.components.len() < 4 {
        return Err(Jpeg2000Error::ColorConversion(format!(
            "CMYK needs 4 components, have {}",
            image.components.len()
        )));
    }
    let planes: Vec<&ImageComponent> = image.components[..4].iter().collect();
    check_same_layout(&planes)?;
    check_planes(&planes)?;

    let mut scale = [0f32; 4];
    for (s, comp) in scale.iter_mut().zip(&planes) {
        *s = 1.0 / checked_precision(comp).map(|p| ((1i64 << p) - 1) as f32)?;
    }

    let max = planes[0].num_samples();
    let mut rgb = [vec![0i32; max], vec![0i32; max], vec![0i32; max]];
    for i in 0..max {
        let c = 1.0 - planes[0].data[i] as f32 * scale[0];
        let m = 1.0 - planes[1].data[i] as f32 * scale[1];
        let y = 1.0 - planes[2].data[i] as f32 * scale[2];
        let k = 1.0 - planes[3].data[i] as f32 * scale[3];
        rgb[0][i] = (255.0 * c * k) as i32;
        rgb[1][i] = (255.0 * m * k) as i32;
        rgb[2][i] = (255.0 * y * k) as i32;
    }

    for (comp, data) in image.components.iter_mut().zip(rgb) {
        comp.data = data;
        comp.precision = 8;
    }
    image.components.remove(3);
    image.color_space = ColorSpace::Srgb;
    debug!(samples = max, "converted CMYK to RGB");
    Ok(())
}

/// Convert e-YCC to RGB.
pub fn esycc_to_rgb(image: &mut Image) -> Result<()> {
    if image.components.len() < 3 {
        return Err(Jpeg2000Error::ColorConversion(format!(
            "e-YCC needs 3 components, have {}",
            image.components.len()
        )));
    }
    let planes: Vec<&ImageComponent> = image.components[..3].iter().collect();
    check_same_layout(&planes)?;
    check_planes(&planes)?;

    let precision = checked_precision(planes[0])?;
    let flip = 1i64 << (precision - 1);
    let max_value = (1i64 << precision) - 1;
    let (sign1, sign2) = (planes[1].signed, planes[2].signed);

    let max = planes[0].num_samples();
    let mut rgb = [vec![0i32; max], vec![0i32; max], vec![0i32; max]];
    for i in 0..max {
        let y = planes[0].data[i] as i64;
        let mut cb = planes[1].data[i] as i64;
        let mut cr = planes[2].data[i] as i64;
        if !sign1 {
            cb -= flip;
        }
        if !sign2 {
            cr -= flip;
        }
        let (y, cb, cr) = (y as f32, cb as f32, cr as f32);

        let r = (y - 0.0000368 * cb + 1.40199 * cr + 0.5) as i64;
        let g = (1.0003 * y - 0.344125 * cb - 0.7141128 * cr + 0.5) as i64;
        let b = (0.999823 * y + 1.77204 * cb - 0.000008 * cr + 0.5) as i64;
        rgb[0][i] = r.clamp(0, max_value) as i32;
        rgb[1][i] = g.clamp(0, max_value) as i32;
        rgb[2][i] = b.clamp(0, max_value) as i32;
    }

    for (comp, data) in image.components.iter_mut().zip(rgb) {
        comp.data = data;
    }
    image.color_space = ColorSpace::Srgb;
    debug!(samples = max, "converted e-YCC to RGB");
    Ok(())
}

fn adopt_layout(comp: &mut ImageComponent, template: &ImageComponent) {
    comp.dx = template.dx;
    comp.dy = template.dy;
    comp.width = template.width;
    comp.height = template.height;
    comp.x0 = template.x0;
    comp.y0 = template.y0;
}

fn checked_precision(comp: &ImageComponent) -> Result<u32> {
    match comp.precision {
        1..=30 => Ok(comp.precision),
        p => Err(Jpeg2000Error::UnsupportedBitDepth(p)),
    }
}

fn check_same_layout(planes: &[&ImageComponent]) -> Result<()> {
    let first = planes[0];
    if planes.iter().all(|p| p.same_layout(first)) {
        Ok(())
    } else {
        Err(Jpeg2000Error::ColorConversion(
            "components do not share one sample grid".into(),
        ))
    }
}

fn check_planes(planes: &[&ImageComponent]) -> Result<()> {
    for plane in planes {
        if plane.data.len() < plane.num_samples() {
            return Err(Jpeg2000Error::BufferTooSmall {
                needed: plane.num_samples(),
                available: plane.data.len(),
            });
        }
    }
    Ok(())
}
