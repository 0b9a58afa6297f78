//! Seekable byte stream over a caller-owned memory buffer.
//!
//! [`MemoryStream`] is the I/O surface handed to the codec: it never
//! allocates or grows the buffer it wraps. Reads copy out of the buffer,
//! writes copy in place, and the cursor is kept within `0..=len` by every
//! operation.

use std::fmt;

use thiserror::Error;

/// Default chunk size the codec uses for its internal stream buffer (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 0x0010_0000;

/// Stream errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Buffer has no bytes.
    #[error("Cannot create a stream over an empty buffer")]
    EmptyBuffer,

    /// Write attempted on a read-mode stream.
    #[error("Stream is read-only")]
    ReadOnly,

    /// Write would run past the end of the buffer.
    #[error("Write of {requested} bytes at offset {offset} exceeds capacity {capacity}")]
    CapacityExceeded {
        offset: usize,
        requested: usize,
        capacity: usize,
    },

    /// Skip or seek target outside `[0, len]`; the cursor was clamped to `len`.
    #[error("Target offset {target} outside stream of length {len}")]
    OutOfRange { target: i128, len: usize },
}

/// Direction of a stream, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Codec reads compressed data from the buffer.
    Read,
    /// Codec writes compressed data into the buffer.
    Write,
}

enum Buffer<'a> {
    Read(&'a [u8]),
    Write(&'a mut [u8]),
}

impl Buffer<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Read(buf) => buf,
            Buffer::Write(buf) => buf,
        }
    }
}

/// Cursor over a fixed memory buffer.
pub struct MemoryStream<'a> {
    buf: Buffer<'a>,
    offset: usize,
    used: usize,
}

impl fmt::Debug for MemoryStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("mode", &self.mode())
            .field("offset", &self.offset)
            .field("len", &self.len())
            .field("used", &self.used)
            .finish()
    }
}

impl<'a> MemoryStream<'a> {
    /// Create a read-mode stream over `data`.
    pub fn reader(data: &'a [u8]) -> Result<Self, StreamError> {
        if data.is_empty() {
            return Err(StreamError::EmptyBuffer);
        }
        Ok(Self {
            used: data.len(),
            buf: Buffer::Read(data),
            offset: 0,
        })
    }

    /// Create a write-mode stream over `data`.
    ///
    /// The buffer length is the stream capacity; nothing is considered
    /// written until the first [`write`](Self::write).
    pub fn writer(data: &'a mut [u8]) -> Result<Self, StreamError> {
        if data.is_empty() {
            return Err(StreamError::EmptyBuffer);
        }
        Ok(Self {
            buf: Buffer::Write(data),
            offset: 0,
            used: 0,
        })
    }

    /// Stream direction.
    pub fn mode(&self) -> StreamMode {
        match self.buf {
            Buffer::Read(_) => StreamMode::Read,
            Buffer::Write(_) => StreamMode::Write,
        }
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.buf.as_slice().len()
    }

    /// Always false; empty buffers are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cursor offset.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.len() - self.offset
    }

    /// Logical length of the data: the whole buffer for readers, the
    /// high-water mark of writes for writers.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes written so far, up to the high-water mark.
    pub fn written(&self) -> &[u8] {
        &self.buf.as_slice()[..self.used]
    }

    /// Copy up to `dest.len()` bytes from the cursor into `dest`.
    ///
    /// Returns `None` once the cursor sits at the end of the buffer. A copy
    /// shorter than requested is a normal partial read.
    pub fn read(&mut self, dest: &mut [u8]) -> Option<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }
        let count = dest.len().min(remaining);
        let start = self.offset;
        dest[..count].copy_from_slice(&self.buf.as_slice()[start..start + count]);
        self.offset += count;
        Some(count)
    }

    /// Copy `src` into the buffer at the cursor.
    pub fn write(&mut self, src: &[u8]) -> Result<usize, StreamError> {
        let offset = self.offset;
        let Buffer::Write(buf) = &mut self.buf else {
            return Err(StreamError::ReadOnly);
        };
        let capacity = buf.len();
        let end = offset
            .checked_add(src.len())
            .filter(|&end| end <= capacity)
            .ok_or(StreamError::CapacityExceeded {
                offset,
                requested: src.len(),
                capacity,
            })?;

        buf[offset..end].copy_from_slice(src);
        self.offset = end;
        self.used = self.used.max(end);
        Ok(src.len())
    }

    /// Move the cursor by `count` bytes, forwards or backwards.
    ///
    /// A target outside `[0, len]` leaves the cursor at `len`.
    pub fn skip(&mut self, count: i64) -> Result<i64, StreamError> {
        let target = self.offset as i128 + count as i128;
        self.move_to(target)?;
        Ok(count)
    }

    /// Move the cursor to the absolute offset `pos`.
    ///
    /// A target past `len` leaves the cursor at `len`.
    pub fn seek(&mut self, pos: u64) -> Result<(), StreamError> {
        self.move_to(pos as i128)
    }

    fn move_to(&mut self, target: i128) -> Result<(), StreamError> {
        let len = self.len();
        if (0..=len as i128).contains(&target) {
            self.offset = target as usize;
            Ok(())
        } else {
            self.offset = len;
            Err(StreamError::OutOfRange { target, len })
        }
    }
}
