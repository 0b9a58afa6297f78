#![no_main]

//! Fuzz target for the memory stream adapter.
//!
//! Drives read/write/skip/seek sequences over read- and write-mode streams
//! and checks the cursor never leaves the buffer.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use opj_membuf::MemoryStream;

#[derive(Arbitrary, Debug)]
struct StreamInput {
    data: Vec<u8>,
    capacity: u16,
    ops: Vec<StreamOp>,
    test_mode: StreamTestMode,
}

#[derive(Arbitrary, Debug)]
enum StreamOp {
    Read(u16),
    Write(Vec<u8>),
    Skip(i64),
    Seek(u64),
}

#[derive(Arbitrary, Debug)]
enum StreamTestMode {
    /// Reader over `data`
    Read,
    /// Writer with `capacity` bytes
    Write,
}

fuzz_target!(|input: StreamInput| {
    // Limit input size
    if input.data.len() > 64 * 1024 || input.ops.len() > 1024 {
        return;
    }

    let mut backing = vec![0u8; input.capacity as usize];
    let stream = match input.test_mode {
        StreamTestMode::Read => MemoryStream::reader(&input.data),
        StreamTestMode::Write => MemoryStream::writer(&mut backing),
    };
    let Ok(mut stream) = stream else {
        return;
    };

    let mut scratch = vec![0u8; u16::MAX as usize];
    for op in &input.ops {
        match op {
            StreamOp::Read(n) => {
                let n = *n as usize;
                if let Some(read) = stream.read(&mut scratch[..n]) {
                    assert!(read <= n);
                }
            }
            StreamOp::Write(bytes) => {
                let _ = stream.write(bytes);
            }
            StreamOp::Skip(n) => {
                let _ = stream.skip(*n);
            }
            StreamOp::Seek(pos) => {
                let _ = stream.seek(*pos);
            }
        }
        assert!(stream.position() <= stream.len());
        assert!(stream.used() <= stream.len());
    }
});
