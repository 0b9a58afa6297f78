#![no_main]

//! Fuzz target for colorspace post-processing.
//!
//! Builds images with arbitrary component layouts and sample values and
//! runs the output conversion; it must either convert or report, never panic.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use opj_membuf::color::convert_for_output;
use opj_membuf::{ColorSpace, Image, ImageComponent, OutputFormat};

#[derive(Arbitrary, Debug)]
struct ColorInput {
    x0: u8,
    y0: u8,
    width: u8,
    height: u8,
    color_space: ColorSpaceTag,
    components: Vec<ComponentInput>,
    tiff: bool,
}

#[derive(Arbitrary, Debug)]
struct ComponentInput {
    dx: u8,
    dy: u8,
    precision: u8,
    signed: bool,
    samples: Vec<i32>,
}

#[derive(Arbitrary, Debug)]
enum ColorSpaceTag {
    Unspecified,
    Srgb,
    YCbCr,
    ExtendedYCbCr,
    Cmyk,
}

fuzz_target!(|input: ColorInput| {
    if input.components.len() > 8 {
        return;
    }

    let color_space = match input.color_space {
        ColorSpaceTag::Unspecified => ColorSpace::Unspecified,
        ColorSpaceTag::Srgb => ColorSpace::Srgb,
        ColorSpaceTag::YCbCr => ColorSpace::YCbCr,
        ColorSpaceTag::ExtendedYCbCr => ColorSpace::ExtendedYCbCr,
        ColorSpaceTag::Cmyk => ColorSpace::Cmyk,
    };
    let (x0, y0) = (input.x0 as u32, input.y0 as u32);
    let bounds = (x0, y0, x0 + input.width as u32, y0 + input.height as u32);

    let mut image = Image::new(bounds.0, bounds.1, bounds.2, bounds.3, color_space);
    for comp in &input.components {
        let dx = (comp.dx % 4) as u32 + 1;
        let dy = (comp.dy % 4) as u32 + 1;
        let mut c = ImageComponent::on_grid(bounds, dx, dy, comp.precision as u32 % 40, comp.signed);
        c.data = comp.samples.iter().copied().cycle().take(c.num_samples()).collect();
        image.components.push(c);
    }

    let output = if input.tiff { OutputFormat::Tif } else { OutputFormat::Pxm };
    let converted_from = image.color_space;
    if convert_for_output(&mut image, output).is_ok()
        && converted_from != ColorSpace::Srgb
        && image.color_space == ColorSpace::Srgb
    {
        let first = image.components[0].num_samples();
        assert!(image.components.iter().take(3).all(|c| c.data.len() >= first));
    }
});
