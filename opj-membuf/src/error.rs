//! Error types for the JPEG 2000 bridge.

use thiserror::Error;

use crate::codec::ContainerFormat;
use crate::stream::StreamError;

/// Result type for JPEG 2000 operations.
pub type Result<T> = std::result::Result<T, Jpeg2000Error>;

/// Failure reported by a codec backend for a single call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation}: {message}")]
pub struct CodecError {
    /// Codec entry point that failed.
    pub operation: &'static str,
    /// Backend-specific detail.
    pub message: String,
}

impl CodecError {
    /// Create a new codec error.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// JPEG 2000 bridge errors.
#[derive(Debug, Error)]
pub enum Jpeg2000Error {
    /// Input buffer missing or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Container format the decoder cannot open.
    #[error("Unsupported format: {0:?}")]
    UnsupportedFormat(ContainerFormat),

    /// Decoder or encoder setup rejected the parameters.
    #[error("Failed to setup the codec")]
    SetupFailed(#[source] CodecError),

    /// Main header (and JP2 boxes) could not be read.
    #[error("Failed to read the header")]
    HeaderReadFailed(#[source] CodecError),

    /// Decode area rejected.
    #[error("Failed to set the decoded area")]
    RegionSetupFailed(#[source] CodecError),

    /// Decode body or end-of-decode failed.
    #[error("Failed to decode image")]
    DecodeFailed(#[source] CodecError),

    /// Encode sequence failed.
    #[error("Failed to encode image")]
    EncodeFailed(#[source] CodecError),

    /// No end-of-codestream marker in the buffer.
    #[error("No end of codestream marker found")]
    NoEndMarker,

    /// Invalid image dimensions.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Unsupported bit depth.
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u32),

    /// Unsupported number of components.
    #[error("Unsupported component count: {0}")]
    UnsupportedComponentCount(usize),

    /// Buffer too small.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Colorspace conversion not applicable to the image layout.
    #[error("Color conversion: {0}")]
    ColorConversion(String),

    /// Memory stream error.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::new("opj_read_header", "truncated SIZ");
        assert_eq!(err.to_string(), "opj_read_header: truncated SIZ");
    }

    #[test]
    fn test_step_errors_keep_source() {
        let err = Jpeg2000Error::HeaderReadFailed(CodecError::new("read_header", "bad"));
        assert_eq!(err.to_string(), "Failed to read the header");
        assert_eq!(err.source().unwrap().to_string(), "read_header: bad");
    }

    #[test]
    fn test_stream_error_conversion() {
        let err: Jpeg2000Error = StreamError::EmptyBuffer.into();
        assert!(matches!(err, Jpeg2000Error::Stream(StreamError::EmptyBuffer)));
    }
}
