//! JPEG2000 decode orchestration.
//!
//! [`decompress`] drives one decode through a [`Codec`] backend: memory
//! stream, session, setup, header, decode area, decode and end of decode,
//! followed by colorspace post-processing. Whatever the outcome, every
//! session and stream obtained from the backend is released exactly once.

use std::fmt;

use tracing::{debug, error, warn};

use crate::codec::{Codec, CodecScope, ContainerFormat, DecodeArea, DecoderParameters};
use crate::color;
use crate::error::CodecError;
use crate::image::Image;
use crate::parser;
use crate::stream::{MemoryStream, DEFAULT_CHUNK_SIZE};
use crate::types::OutputFormat;
use crate::{Jpeg2000Error, Result};

/// Decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderConfig {
    /// Output container the caller will write; steers colorspace conversion.
    pub output_format: OutputFormat,
    /// Chunk size for the codec's stream buffer.
    pub chunk_size: usize,
    /// Drop bytes after the last end-of-codestream marker before decoding.
    pub trim_trailing: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pxm,
            chunk_size: DEFAULT_CHUNK_SIZE,
            trim_trailing: true,
        }
    }
}

/// Decode `data` as `format` into an image ready for `output`.
///
/// Decoder parameters are library defaults and the whole image is decoded.
pub fn decompress<C: Codec>(
    codec: &mut C,
    data: &[u8],
    format: ContainerFormat,
    output: OutputFormat,
) -> Result<Image> {
    decompress_with(codec, data, format, output, DEFAULT_CHUNK_SIZE)
}

/// Decode a codestream or JP2 file that may carry trailing bytes.
///
/// The buffer is cut after its last end-of-codestream marker and the
/// container is detected from the JP2 signature.
pub fn decode_j2k<C: Codec>(codec: &mut C, data: &[u8]) -> Result<Image> {
    if data.is_empty() {
        return Err(Jpeg2000Error::InvalidInput("empty buffer".into()));
    }
    let data = parser::trim_to_end_marker(data)?;
    decompress(codec, data, parser::detect_format(data), OutputFormat::Pxm)
}

fn decompress_with<C: Codec>(
    codec: &mut C,
    data: &[u8],
    format: ContainerFormat,
    output: OutputFormat,
    chunk_size: usize,
) -> Result<Image> {
    let memory = MemoryStream::reader(data).map_err(|e| {
        error!(error = %e, "cannot create a stream over the input");
        Jpeg2000Error::InvalidInput(e.to_string())
    })?;
    let params = DecoderParameters::default();

    let mut scope = CodecScope::new(codec);
    let stream = scope
        .codec
        .create_stream(memory, chunk_size)
        .map_err(|e| step_failed("failed to create the stream", e, Jpeg2000Error::SetupFailed))?;
    let stream = scope.stream.insert(stream);

    if !format.is_decodable() {
        error!(?format, "unsupported container format");
        return Err(Jpeg2000Error::UnsupportedFormat(format));
    }
    let session = scope
        .codec
        .create_decompress(format)
        .map_err(|e| step_failed("failed to create the decoder", e, Jpeg2000Error::SetupFailed))?;
    let session = scope.session.insert(session);

    scope
        .codec
        .setup_decoder(session, &params)
        .map_err(|e| step_failed("failed to setup the decoder", e, Jpeg2000Error::SetupFailed))?;

    let mut image = scope
        .codec
        .read_header(stream, session)
        .map_err(|e| step_failed("failed to read the header", e, Jpeg2000Error::HeaderReadFailed))?;

    scope
        .codec
        .set_decode_area(session, &image, DecodeArea::FULL)
        .map_err(|e| {
            step_failed("failed to set the decoded area", e, Jpeg2000Error::RegionSetupFailed)
        })?;

    scope
        .codec
        .decode(session, stream, &mut image)
        .and_then(|()| scope.codec.end_decompress(session, stream))
        .map_err(|e| step_failed("failed to decode image", e, Jpeg2000Error::DecodeFailed))?;

    drop(scope);

    if let Err(e) = color::convert_for_output(&mut image, output) {
        warn!(error = %e, color_space = ?image.color_space, "leaving image in its decoded color space");
    }

    debug!(
        ?format,
        width = image.width(),
        height = image.height(),
        components = image.num_components(),
        color_space = ?image.color_space,
        "decoded image"
    );
    Ok(image)
}

fn step_failed(
    what: &'static str,
    err: CodecError,
    wrap: fn(CodecError) -> Jpeg2000Error,
) -> Jpeg2000Error {
    error!(error = %err, "{what}");
    wrap(err)
}

/// Reusable JPEG2000 decoder over a codec backend.
///
/// ```rust,ignore
/// use opj_membuf::Jpeg2000Decoder;
///
/// let mut decoder = Jpeg2000Decoder::new();
/// let image = decoder.decode(&j2k_data)?;
/// let rgb = image.to_rgb_bytes()?;
/// ```
pub struct Jpeg2000Decoder<C: Codec> {
    codec: C,
    config: DecoderConfig,
    images_decoded: u64,
}

impl<C: Codec> fmt::Debug for Jpeg2000Decoder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jpeg2000Decoder")
            .field("config", &self.config)
            .field("images_decoded", &self.images_decoded)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> Jpeg2000Decoder<C> {
    /// Create a decoder over `codec` with the default configuration.
    pub fn with_codec(codec: C) -> Self {
        Self::with_config(codec, DecoderConfig::default())
    }

    /// Create a decoder over `codec`.
    pub fn with_config(codec: C, config: DecoderConfig) -> Self {
        Self {
            codec,
            config,
            images_decoded: 0,
        }
    }

    /// Decode a JPEG2000 codestream or JP2 file, detecting the container.
    pub fn decode(&mut self, data: &[u8]) -> Result<Image> {
        if data.is_empty() {
            return Err(Jpeg2000Error::InvalidInput("empty buffer".into()));
        }
        let data = if self.config.trim_trailing {
            parser::trim_to_end_marker(data)?
        } else {
            data
        };
        self.decode_with_format(data, parser::detect_format(data))
    }

    /// Decode `data` as the given container format, as-is.
    pub fn decode_with_format(&mut self, data: &[u8], format: ContainerFormat) -> Result<Image> {
        let image = decompress_with(
            &mut self.codec,
            data,
            format,
            self.config.output_format,
            self.config.chunk_size,
        )?;
        self.images_decoded += 1;
        Ok(image)
    }

    /// Get the decoder configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Get total images decoded.
    pub fn images_decoded(&self) -> u64 {
        self.images_decoded
    }

    /// Get the codec backend.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Consume the decoder, returning the backend.
    pub fn into_codec(self) -> C {
        self.codec
    }
}

#[cfg(feature = "ffi-openjpeg")]
impl Jpeg2000Decoder<crate::ffi::OpenJpeg> {
    /// Create a decoder over OpenJPEG.
    pub fn new() -> Self {
        Self::with_codec(crate::ffi::OpenJpeg::new())
    }
}

#[cfg(feature = "ffi-openjpeg")]
impl Default for Jpeg2000Decoder<crate::ffi::OpenJpeg> {
    fn default() -> Self {
        Self::new()
    }
}
