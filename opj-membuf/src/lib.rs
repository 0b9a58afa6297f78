//! In-memory JPEG2000 decode and encode over an external codec.
//!
//! This crate wires caller-owned byte buffers to a JPEG2000 codec library
//! (OpenJPEG with the `ffi-openjpeg` feature) and drives the codec's call
//! sequence, releasing every handle exactly once on every path.
//!
//! ## Features
//!
//! - **Memory streams**: read/write/skip/seek over a fixed buffer, never reallocated
//! - **Decode orchestration**: header, decode area, decode and end of decode in one call
//! - **Colorspace normalization**: sYCC (4:4:4, 4:2:2, 4:2:0), CMYK and e-YCC to RGB
//! - **Trailing-garbage tolerance**: trim after the last end marker, detect JP2 by signature
//! - **Encoding**: raw interleaved samples to codestream or JP2
//!
//! ## Usage
//!
//! ### Decoding (requires `ffi-openjpeg` feature)
//!
//! ```rust,ignore
//! use opj_membuf::Jpeg2000Decoder;
//!
//! let mut decoder = Jpeg2000Decoder::new();
//! let image = decoder.decode(&j2k_data)?;
//! println!("Image: {}x{}, {} components", image.width(), image.height(), image.num_components());
//! ```
//!
//! ### Any backend
//!
//! ```rust,ignore
//! use opj_membuf::{decompress, ContainerFormat, OutputFormat};
//!
//! let image = decompress(&mut my_codec, &data, ContainerFormat::Jp2, OutputFormat::Png)?;
//! ```

pub mod codec;
pub mod color;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod image;
pub mod parser;
pub mod raw;
pub mod stream;
pub mod types;

#[cfg(feature = "ffi-openjpeg")]
pub mod ffi;

pub use codec::{
    Codec, CodecResult, ContainerFormat, DecodeArea, DecoderParameters, EncodeCodec, EncoderParameters,
};
pub use decoder::{decode_j2k, decompress, DecoderConfig, Jpeg2000Decoder};
pub use encoder::{compress, Jpeg2000Encoder};
pub use error::{CodecError, Jpeg2000Error, Result};
pub use image::{Image, ImageComponent, InterleavedSamples};
pub use raw::{image_from_raw, RawImageParams};
pub use stream::{MemoryStream, StreamError, StreamMode, DEFAULT_CHUNK_SIZE};
pub use types::*;

#[cfg(feature = "ffi-openjpeg")]
pub use ffi::OpenJpeg;

/// Codestream markers used for framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerType {
    /// Start of codestream (SOC).
    Soc,
    /// End of codestream (EOC).
    Eoc,
}

impl MarkerType {
    /// Get the marker code.
    pub fn code(&self) -> u16 {
        match self {
            MarkerType::Soc => 0xFF4F,
            MarkerType::Eoc => 0xFFD9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_code() {
        assert_eq!(MarkerType::Soc.code(), 0xFF4F);
        assert_eq!(MarkerType::Eoc.code(), 0xFFD9);
    }
}
