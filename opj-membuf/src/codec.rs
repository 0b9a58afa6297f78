//! Codec collaborator interface.
//!
//! The JPEG 2000 coding itself lives in an external library. [`Codec`] is the
//! slice of its API the decode pipeline drives, [`EncodeCodec`] the encode
//! direction. Backends own their session and stream handles; the
//! orchestrators guarantee every handle they obtain is released exactly once
//! through [`Codec::destroy_codec`] / [`Codec::destroy_stream`].

use crate::error::CodecError;
use crate::image::Image;
use crate::{Jpeg2000Error, Result};
use crate::stream::MemoryStream;
use crate::types::ProgressionOrder;

/// Result of a single backend call.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Container wrapped around the codestream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContainerFormat {
    /// Raw J2K codestream.
    Codestream,
    /// JP2 boxed file.
    Jp2,
    /// JPIP stream. Recognised, not decodable here.
    Jpt,
}

impl ContainerFormat {
    /// Numeric code used by command line front ends (0: J2K, 1: JP2, 2: JPT).
    pub fn code(&self) -> i32 {
        match self {
            ContainerFormat::Codestream => 0,
            ContainerFormat::Jp2 => 1,
            ContainerFormat::Jpt => 2,
        }
    }

    /// Create from code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ContainerFormat::Codestream),
            1 => Some(ContainerFormat::Jp2),
            2 => Some(ContainerFormat::Jpt),
            _ => None,
        }
    }

    /// Whether the decode pipeline can open a session for this format.
    pub fn is_decodable(&self) -> bool {
        !matches!(self, ContainerFormat::Jpt)
    }
}

/// Rectangle on the reference grid to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeArea {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl DecodeArea {
    /// All-zero sentinel: no restriction, decode the whole image.
    pub const FULL: DecodeArea = DecodeArea {
        x0: 0,
        y0: 0,
        x1: 0,
        y1: 0,
    };

    /// True for the no-restriction sentinel.
    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

/// Core decoder parameters, built fresh for every decode call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderParameters {
    /// Number of highest resolution levels to discard.
    pub reduce: u32,
    /// Maximum quality layers to decode (0 = all).
    pub max_layers: u32,
}

/// Core encoder parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncoderParameters {
    /// Horizontal subsampling applied to every component.
    pub subsampling_dx: u32,
    /// Vertical subsampling applied to every component.
    pub subsampling_dy: u32,
    /// Image origin on the reference grid (x).
    pub image_offset_x0: u32,
    /// Image origin on the reference grid (y).
    pub image_offset_y0: u32,
    /// Number of resolution levels (decomposition levels + 1).
    pub num_resolutions: u32,
    /// Compression ratio per quality layer; empty for lossless.
    pub rates: Vec<f32>,
    /// Use the irreversible 9/7 wavelet.
    pub irreversible: bool,
    /// Tile size, `None` for a single tile.
    pub tile_size: Option<(u32, u32)>,
    /// Code-block width.
    pub code_block_width: u32,
    /// Code-block height.
    pub code_block_height: u32,
    /// Progression order.
    pub progression_order: ProgressionOrder,
    /// Output container.
    pub format: ContainerFormat,
}

impl Default for EncoderParameters {
    fn default() -> Self {
        Self {
            subsampling_dx: 1,
            subsampling_dy: 1,
            image_offset_x0: 0,
            image_offset_y0: 0,
            num_resolutions: 6,
            rates: Vec::new(),
            irreversible: false,
            tile_size: None,
            code_block_width: 64,
            code_block_height: 64,
            progression_order: ProgressionOrder::Lrcp,
            format: ContainerFormat::Codestream,
        }
    }
}

impl EncoderParameters {
    /// Lossless single-layer defaults.
    pub fn lossless() -> Self {
        Self::default()
    }

    /// Lossy irreversible coding at the given compression ratio.
    pub fn lossy(ratio: f32) -> Self {
        Self {
            rates: vec![ratio],
            irreversible: true,
            ..Self::default()
        }
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.subsampling_dx == 0 || self.subsampling_dy == 0 {
            return Err(Jpeg2000Error::InvalidInput(format!(
                "subsampling must be non-zero, got {}x{}",
                self.subsampling_dx, self.subsampling_dy
            )));
        }

        if !(1..=MAX_RESOLUTIONS).contains(&self.num_resolutions) {
            return Err(Jpeg2000Error::InvalidInput(format!(
                "Number of resolutions must be 1-{MAX_RESOLUTIONS}"
            )));
        }

        let (cbw, cbh) = (self.code_block_width, self.code_block_height);
        let valid_side = |side: u32| side.is_power_of_two() && (4..=1024).contains(&side);
        if !valid_side(cbw) || !valid_side(cbh) || cbw * cbh > 4096 {
            return Err(Jpeg2000Error::InvalidInput(format!(
                "Invalid code-block size {cbw}x{cbh}"
            )));
        }

        if self.rates.len() > MAX_LAYERS || self.rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(Jpeg2000Error::InvalidInput("Invalid layer rates".into()));
        }

        if let Some((tw, th)) = self.tile_size {
            if tw == 0 || th == 0 {
                return Err(Jpeg2000Error::InvalidDimensions { width: tw, height: th });
            }
        }

        Ok(())
    }
}

/// Highest number of resolution levels a codestream can declare.
pub const MAX_RESOLUTIONS: u32 = 33;

/// Highest number of quality layers the codec accepts rates for.
pub const MAX_LAYERS: usize = 100;

/// External JPEG 2000 decoder API.
///
/// Calls happen in the fixed order `create_stream`, `create_decompress`,
/// `setup_decoder`, `read_header`, `set_decode_area`, `decode`,
/// `end_decompress`; the pipeline stops at the first error.
pub trait Codec {
    /// Per-call codec session.
    type Session;
    /// Codec-side stream bound to a memory buffer.
    type Stream<'buf>;

    /// Wrap a memory stream for the codec.
    fn create_stream<'buf>(
        &mut self,
        stream: MemoryStream<'buf>,
        chunk_size: usize,
    ) -> CodecResult<Self::Stream<'buf>>;

    /// Open a decoding session for the container format.
    fn create_decompress(&mut self, format: ContainerFormat) -> CodecResult<Self::Session>;

    /// Apply decoder parameters.
    fn setup_decoder(
        &mut self,
        session: &mut Self::Session,
        params: &DecoderParameters,
    ) -> CodecResult<()>;

    /// Read the main header (and JP2 boxes) into an image descriptor
    /// without sample data.
    fn read_header(
        &mut self,
        stream: &mut Self::Stream<'_>,
        session: &mut Self::Session,
    ) -> CodecResult<Image>;

    /// Restrict decoding to `area`; [`DecodeArea::FULL`] means the whole image.
    fn set_decode_area(
        &mut self,
        session: &mut Self::Session,
        image: &Image,
        area: DecodeArea,
    ) -> CodecResult<()>;

    /// Decode tile data into `image`.
    fn decode(
        &mut self,
        session: &mut Self::Session,
        stream: &mut Self::Stream<'_>,
        image: &mut Image,
    ) -> CodecResult<()>;

    /// Read up to the end of the codestream.
    fn end_decompress(
        &mut self,
        session: &mut Self::Session,
        stream: &mut Self::Stream<'_>,
    ) -> CodecResult<()>;

    /// Release a session.
    fn destroy_codec(&mut self, session: Self::Session);

    /// Release a stream and the memory stream it wraps.
    fn destroy_stream(&mut self, stream: Self::Stream<'_>);
}

/// External JPEG 2000 encoder API.
pub trait EncodeCodec: Codec {
    /// Open an encoding session for the container format.
    fn create_compress(&mut self, format: ContainerFormat) -> CodecResult<Self::Session>;

    /// Apply encoder parameters for `image`.
    fn setup_encoder(
        &mut self,
        session: &mut Self::Session,
        params: &EncoderParameters,
        image: &Image,
    ) -> CodecResult<()>;

    /// Write the main header.
    fn start_compress(
        &mut self,
        session: &mut Self::Session,
        image: &Image,
        stream: &mut Self::Stream<'_>,
    ) -> CodecResult<()>;

    /// Encode all tiles.
    fn encode(&mut self, session: &mut Self::Session, stream: &mut Self::Stream<'_>) -> CodecResult<()>;

    /// Write the end-of-codestream marker and flush.
    fn end_compress(
        &mut self,
        session: &mut Self::Session,
        stream: &mut Self::Stream<'_>,
    ) -> CodecResult<()>;

    /// High-water mark of the memory stream behind `stream`.
    fn bytes_written(&self, stream: &Self::Stream<'_>) -> usize;
}

/// Holds the stream and session of one orchestrated call and releases
/// whichever of them were created, session first, when dropped.
pub(crate) struct CodecScope<'c, 'buf, C: Codec> {
    pub(crate) codec: &'c mut C,
    pub(crate) stream: Option<C::Stream<'buf>>,
    pub(crate) session: Option<C::Session>,
}

impl<'c, C: Codec> CodecScope<'c, '_, C> {
    pub(crate) fn new(codec: &'c mut C) -> Self {
        Self {
            codec,
            stream: None,
            session: None,
        }
    }
}

impl<C: Codec> Drop for CodecScope<'_, '_, C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.codec.destroy_codec(session);
        }
        if let Some(stream) = self.stream.take() {
            self.codec.destroy_stream(stream);
        }
    }
}
