//! Property-based tests for the memory stream cursor.

use opj_membuf::{MemoryStream, StreamError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Read(usize),
    Skip(i64),
    Seek(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..64).prop_map(Op::Read),
        (-80i64..80).prop_map(Op::Skip),
        (0u64..80).prop_map(Op::Seek),
    ]
}

// =============================================================================
// Read-mode cursor laws
// =============================================================================

proptest! {
    /// The cursor never leaves [0, len] whatever the operation sequence.
    #[test]
    fn cursor_stays_in_bounds(data in prop::collection::vec(any::<u8>(), 1..64), ops in prop::collection::vec(op(), 0..32)) {
        let mut stream = MemoryStream::reader(&data).unwrap();
        let mut buf = [0u8; 64];
        for op in ops {
            match op {
                Op::Read(n) => { stream.read(&mut buf[..n]); }
                Op::Skip(n) => { let _ = stream.skip(n); }
                Op::Seek(p) => { let _ = stream.seek(p); }
            }
            prop_assert!(stream.position() <= stream.len());
            prop_assert_eq!(stream.position() + stream.remaining(), data.len());
        }
    }

    /// Reads return exactly the buffer bytes in order, and signal end only
    /// when nothing is left.
    #[test]
    fn reads_reproduce_buffer(data in prop::collection::vec(any::<u8>(), 1..256), chunk in 1usize..32) {
        let mut stream = MemoryStream::reader(&data).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        while let Some(n) = stream.read(&mut buf) {
            prop_assert!(n > 0 && n <= chunk);
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(out, data);
    }

    /// After seek(k), a read starts at byte k.
    #[test]
    fn seek_then_read(data in prop::collection::vec(any::<u8>(), 1..128), k in 0usize..128) {
        let k = k % data.len();
        let mut stream = MemoryStream::reader(&data).unwrap();
        stream.seek(k as u64).unwrap();
        let mut byte = [0u8; 1];
        prop_assert_eq!(stream.read(&mut byte), Some(1));
        prop_assert_eq!(byte[0], data[k]);
    }

    /// Seeking past the end fails and parks the cursor at the end.
    #[test]
    fn seek_past_end_clamps(data in prop::collection::vec(any::<u8>(), 1..64), extra in 1u64..1000) {
        let len = data.len();
        let mut stream = MemoryStream::reader(&data).unwrap();
        let err = stream.seek(len as u64 + extra).unwrap_err();
        let is_out_of_range = matches!(err, StreamError::OutOfRange { .. });
        prop_assert!(is_out_of_range);
        prop_assert_eq!(stream.position(), len);
        prop_assert_eq!(stream.read(&mut [0u8; 1]), None);
    }

    /// seek(0) followed by skip(k) lands where seek(k) does.
    #[test]
    fn skip_from_start_matches_seek(data in prop::collection::vec(any::<u8>(), 1..64), k in 0i64..64) {
        let k = k % (data.len() as i64 + 1);
        let mut a = MemoryStream::reader(&data).unwrap();
        let mut b = MemoryStream::reader(&data).unwrap();
        a.seek(0).unwrap();
        prop_assert_eq!(a.skip(k), Ok(k));
        b.seek(k as u64).unwrap();
        prop_assert_eq!(a.position(), b.position());
    }
}

// =============================================================================
// Write-mode laws
// =============================================================================

proptest! {
    /// Writes that fit land in order; the first that does not fit is
    /// rejected and leaves cursor and contents untouched.
    #[test]
    fn writes_respect_capacity(cap in 1usize..64, chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..16)) {
        let mut buf = vec![0u8; cap];
        let mut expected = Vec::new();
        {
            let mut stream = MemoryStream::writer(&mut buf).unwrap();
            for chunk in &chunks {
                let before = stream.position();
                match stream.write(chunk) {
                    Ok(n) => {
                        prop_assert_eq!(n, chunk.len());
                        expected.extend_from_slice(chunk);
                    }
                    Err(_) => {
                        prop_assert!(before + chunk.len() > cap);
                        prop_assert_eq!(stream.position(), before);
                    }
                }
                prop_assert_eq!(stream.used(), expected.len());
            }
            prop_assert_eq!(stream.written(), &expected[..]);
        }
        prop_assert_eq!(&buf[..expected.len()], &expected[..]);
    }
}
