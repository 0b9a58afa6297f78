//! Codestream framing helpers.
//!
//! Just enough marker inspection to hand the codec a clean buffer: container
//! detection from the leading signature and trimming of trailing bytes after
//! the end-of-codestream marker. Header parsing proper is left to the codec.

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use crate::codec::ContainerFormat;
use crate::{Jpeg2000Error, MarkerType, Result};

/// JP2 signature box: length 12, type `jP  `, content `\r\n\x87\n`.
pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

/// Check if data starts with the complete JP2 signature box.
pub fn is_jp2_file(data: &[u8]) -> bool {
    data.starts_with(&JP2_SIGNATURE)
}

/// Check if data starts with the start-of-codestream marker.
pub fn is_codestream(data: &[u8]) -> bool {
    data.len() >= 2 && BigEndian::read_u16(&data[0..2]) == MarkerType::Soc.code()
}

/// Pick the container format from the leading bytes.
///
/// Anything not carrying the JP2 signature is treated as a raw codestream;
/// the codec reports malformed data when it reads the header.
pub fn detect_format(data: &[u8]) -> ContainerFormat {
    if is_jp2_file(data) {
        ContainerFormat::Jp2
    } else {
        ContainerFormat::Codestream
    }
}

/// Drop trailing bytes after the last end-of-codestream marker.
///
/// The scan runs backward for the low byte of EOC (`0xD9`); the returned
/// slice ends just after it.
pub fn trim_to_end_marker(data: &[u8]) -> Result<&[u8]> {
    let eoc_low = MarkerType::Eoc.code().to_be_bytes()[1];
    let end = data
        .iter()
        .rposition(|&b| b == eoc_low)
        .map(|idx| idx + 1)
        .ok_or(Jpeg2000Error::NoEndMarker)?;
    if end < data.len() {
        trace!(trimmed = data.len() - end, "dropping bytes after end marker");
    }
    Ok(&data[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_jp2_file() {
        assert!(is_jp2_file(&JP2_SIGNATURE));
        let mut with_body = JP2_SIGNATURE.to_vec();
        with_body.extend_from_slice(&[0, 0, 0, 0x14, b'f', b't', b'y', b'p']);
        assert!(is_jp2_file(&with_body));
        assert!(!is_jp2_file(&[0xFF, 0x4F]));
        // Box type alone is not enough.
        assert!(!is_jp2_file(&[0, 0, 0, 0x0C, b'j', b'P', b' ', b' ', 0, 0, 0, 0]));
    }

    #[test]
    fn test_is_codestream() {
        assert!(is_codestream(&[0xFF, 0x4F, 0xFF, 0x51]));
        assert!(!is_codestream(&[0x00, 0x00]));
        assert!(!is_codestream(&[0xFF]));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(&JP2_SIGNATURE), ContainerFormat::Jp2);
        assert_eq!(detect_format(&[0xFF, 0x4F]), ContainerFormat::Codestream);
        assert_eq!(detect_format(&JP2_SIGNATURE[..11]), ContainerFormat::Codestream);
    }

    #[test]
    fn test_trim_trailing_garbage() {
        let data = [0xFF, 0x4F, 0x01, 0xFF, 0xD9, 0x00, 0x00, 0x13];
        assert_eq!(trim_to_end_marker(&data).unwrap(), &data[..5]);
    }

    #[test]
    fn test_trim_uses_last_occurrence() {
        let data = [0xFF, 0x4F, 0xD9, 0x02, 0xFF, 0xD9];
        assert_eq!(trim_to_end_marker(&data).unwrap().len(), 6);
    }

    #[test]
    fn test_trim_no_end_marker() {
        assert!(matches!(
            trim_to_end_marker(&[0xFF, 0x4F, 0x00]),
            Err(Jpeg2000Error::NoEndMarker)
        ));
        assert!(matches!(trim_to_end_marker(&[]), Err(Jpeg2000Error::NoEndMarker)));
    }
}
