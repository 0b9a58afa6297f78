//! Shared value types.

/// Image color space, as tagged by the codec or reclassified after decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorSpace {
    /// Not known.
    #[default]
    Unknown,
    /// Present in the file but not specified.
    Unspecified,
    /// sRGB.
    Srgb,
    /// Grayscale.
    Grayscale,
    /// sYCC luma/chroma, possibly with subsampled chroma.
    YCbCr,
    /// e-YCC (extended range luma/chroma).
    ExtendedYCbCr,
    /// CMYK.
    Cmyk,
}

/// Output container the decoded image is destined for.
///
/// Only consulted by colorspace post-processing: CMYK images headed for TIFF
/// keep their four channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputFormat {
    /// PGX.
    Pgx,
    /// PNM/PGM/PPM family.
    #[default]
    Pxm,
    /// BMP.
    Bmp,
    /// TIFF.
    Tif,
    /// Headerless raw samples.
    Raw,
    /// TGA.
    Tga,
    /// PNG.
    Png,
}

/// Progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProgressionOrder {
    /// Layer-Resolution-Component-Position.
    #[default]
    Lrcp,
    /// Resolution-Layer-Component-Position.
    Rlcp,
    /// Resolution-Position-Component-Layer.
    Rpcl,
    /// Position-Component-Resolution-Layer.
    Pcrl,
    /// Component-Position-Resolution-Layer.
    Cprl,
}

/// Byte order of multi-byte raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ColorSpace::default(), ColorSpace::Unknown);
        assert_eq!(OutputFormat::default(), OutputFormat::Pxm);
        assert_eq!(Endianness::default(), Endianness::Big);
    }
}
