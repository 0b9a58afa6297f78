//! JPEG2000 encode orchestration.
//!
//! [`compress`] drives an [`EncodeCodec`] backend into a caller-provided
//! buffer through a write-mode [`MemoryStream`]; [`Jpeg2000Encoder`] sizes
//! that buffer itself and hands back the encoded bytes.

use std::fmt;

use tracing::{debug, error};

use crate::codec::{CodecScope, EncodeCodec, EncoderParameters};
use crate::error::CodecError;
use crate::image::Image;
use crate::raw::{self, RawImageParams};
use crate::stream::{MemoryStream, DEFAULT_CHUNK_SIZE};
use crate::{Jpeg2000Error, Result};

/// Headroom added to the output estimate for headers and JP2 boxes.
const HEADER_RESERVE: usize = 4096;

/// Encode `image` into `output`, returning the number of bytes written.
///
/// Fails with [`Jpeg2000Error::EncodeFailed`] if any codec step fails,
/// including running out of room in `output`.
pub fn compress<C: EncodeCodec>(
    codec: &mut C,
    image: &Image,
    params: &EncoderParameters,
    output: &mut [u8],
) -> Result<usize> {
    params.validate()?;
    if image.components.is_empty() {
        return Err(Jpeg2000Error::UnsupportedComponentCount(0));
    }
    let memory = MemoryStream::writer(output)?;

    let mut scope = CodecScope::new(codec);
    let stream = scope
        .codec
        .create_stream(memory, DEFAULT_CHUNK_SIZE)
        .map_err(encode_failed)?;
    let stream = scope.stream.insert(stream);

    let session = scope.codec.create_compress(params.format).map_err(encode_failed)?;
    let session = scope.session.insert(session);

    scope
        .codec
        .setup_encoder(session, params, image)
        .map_err(encode_failed)?;
    scope
        .codec
        .start_compress(session, image, stream)
        .map_err(encode_failed)?;
    scope.codec.encode(session, stream).map_err(encode_failed)?;
    scope.codec.end_compress(session, stream).map_err(encode_failed)?;

    let written = scope.codec.bytes_written(stream);
    debug!(
        format = ?params.format,
        components = image.num_components(),
        bytes = written,
        "encoded image"
    );
    Ok(written)
}

fn encode_failed(err: CodecError) -> Jpeg2000Error {
    error!(error = %err, "failed to encode image");
    Jpeg2000Error::EncodeFailed(err)
}

/// Upper bound used to size the output buffer for `image`.
pub fn estimate_output_size(image: &Image) -> usize {
    let raw: usize = image
        .components
        .iter()
        .map(|c| c.num_samples() * (c.precision.max(1) as usize).div_ceil(8))
        .sum();
    raw + raw / 2 + HEADER_RESERVE
}

/// Reusable JPEG2000 encoder over a codec backend.
pub struct Jpeg2000Encoder<C: EncodeCodec> {
    codec: C,
    params: EncoderParameters,
    images_encoded: u64,
    bytes_output: u64,
}

impl<C: EncodeCodec> fmt::Debug for Jpeg2000Encoder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jpeg2000Encoder")
            .field("params", &self.params)
            .field("images_encoded", &self.images_encoded)
            .field("bytes_output", &self.bytes_output)
            .finish_non_exhaustive()
    }
}

impl<C: EncodeCodec> Jpeg2000Encoder<C> {
    /// Create an encoder over `codec`.
    pub fn with_codec(codec: C, params: EncoderParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            codec,
            params,
            images_encoded: 0,
            bytes_output: 0,
        })
    }

    /// Encode an image.
    pub fn encode(&mut self, image: &Image) -> Result<Vec<u8>> {
        let mut output = vec![0u8; estimate_output_size(image)];
        let written = compress(&mut self.codec, image, &self.params, &mut output)?;
        output.truncate(written);

        self.images_encoded += 1;
        self.bytes_output += written as u64;
        Ok(output)
    }

    /// Encode interleaved raw samples.
    pub fn encode_raw(&mut self, data: &[u8], raw: &RawImageParams) -> Result<Vec<u8>> {
        let image = raw::image_from_raw(data, raw, &self.params)?;
        self.encode(&image)
    }

    /// Get the encoder parameters.
    pub fn params(&self) -> &EncoderParameters {
        &self.params
    }

    /// Get total images encoded.
    pub fn images_encoded(&self) -> u64 {
        self.images_encoded
    }

    /// Get total bytes output.
    pub fn bytes_output(&self) -> u64 {
        self.bytes_output
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.images_encoded = 0;
        self.bytes_output = 0;
    }

    /// Get the codec backend.
    pub fn codec(&self) -> &C {
        &self.codec
    }
}

#[cfg(feature = "ffi-openjpeg")]
impl Jpeg2000Encoder<crate::ffi::OpenJpeg> {
    /// Create an encoder over OpenJPEG.
    pub fn new(params: EncoderParameters) -> Result<Self> {
        Self::with_codec(crate::ffi::OpenJpeg::new(), params)
    }
}
