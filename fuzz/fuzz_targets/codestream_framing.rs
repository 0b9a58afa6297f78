#![no_main]

//! Fuzz target for codestream framing helpers.
//!
//! Tests end-marker trimming and container detection on arbitrary bytes.

use libfuzzer_sys::fuzz_target;
use opj_membuf::parser::{detect_format, is_codestream, is_jp2_file, trim_to_end_marker};
use opj_membuf::ContainerFormat;

fuzz_target!(|data: &[u8]| {
    // Limit input size
    if data.len() > 1024 * 1024 {
        return;
    }

    match trim_to_end_marker(data) {
        Ok(trimmed) => {
            assert!(!trimmed.is_empty());
            assert_eq!(trimmed.last(), Some(&0xD9));
            assert!(!data[trimmed.len()..].contains(&0xD9));
        }
        Err(_) => assert!(!data.contains(&0xD9)),
    }

    let format = detect_format(data);
    assert_eq!(format == ContainerFormat::Jp2, is_jp2_file(data));
    let _ = is_codestream(data);
});
