//! Chunked binary file transfer.
//!
//! A file is split into bounded-size frames. Each frame on the wire is
//!
//! ```text
//! JSON(ChunkHeader) || 0x0A || payload[chunk_size]
//! ```
//!
//! serde_json escapes control characters inside strings and emits compact
//! output, so the serialized header never contains `0x0A`; a receiver splits
//! on the first newline byte.
//!
//! - [`frame_bytes`] / [`frame_file`]: lazy frame production
//! - [`transfer::send_file`]: ordered, acknowledged publishing of all frames
//! - [`reassembly::Reassembler`]: receiver side

use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::clock::now_iso8601;

pub mod reassembly;
pub mod transfer;

pub use reassembly::{CompletedFile, Reassembler};
pub use transfer::{send_file, TransferError, TransferReport};

/// Separates the JSON header from the raw payload.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Errors raised while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame has no header delimiter")]
    MissingDelimiter,

    #[error("Invalid chunk header: {0}")]
    Header(#[from] serde_json::Error),

    #[error("Payload is {actual} bytes but header declares {declared}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("Chunk index {chunk_index} out of range for {total_chunks} chunks")]
    IndexOutOfRange {
        chunk_index: usize,
        total_chunks: usize,
    },

    #[error("Frame declares {total_chunks} chunks, limit is {limit}")]
    TooManyChunks { total_chunks: usize, limit: usize },

    #[error("Transfer {message_id} announced {expected} chunks, frame says {actual}")]
    TotalMismatch {
        message_id: String,
        expected: usize,
        actual: usize,
    },
}

/// Per-frame metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Shared by every frame of one transfer.
    pub message_id: String,
    pub filename: String,
    /// Zero-based, contiguous within a transfer.
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub timestamp: String,
    /// Exact byte length of this frame's payload.
    pub chunk_size: usize,
}

/// One header-plus-payload unit of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFrame {
    pub header: ChunkHeader,
    pub payload: Bytes,
}

impl ChunkFrame {
    /// Encode to the wire representation.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let header = serde_json::to_vec(&self.header)?;
        let mut buf = BytesMut::with_capacity(header.len() + 1 + self.payload.len());
        buf.put_slice(&header);
        buf.put_u8(FRAME_DELIMITER);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode a wire frame: header up to the first `0x0A`, payload after it.
    pub fn decode(wire: Bytes) -> Result<Self, FrameError> {
        let split = wire
            .iter()
            .position(|b| *b == FRAME_DELIMITER)
            .ok_or(FrameError::MissingDelimiter)?;

        let header: ChunkHeader = serde_json::from_slice(&wire[..split])?;
        let payload = wire.slice(split + 1..);

        if payload.len() != header.chunk_size {
            return Err(FrameError::SizeMismatch {
                declared: header.chunk_size,
                actual: payload.len(),
            });
        }

        Ok(Self { header, payload })
    }
}

/// Number of frames needed for `len` bytes at `chunk_size` bytes per frame.
pub fn total_chunks(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Lazy, single-pass sequence of frames for one transfer.
///
/// Frames share one freshly generated `message_id`; payloads are zero-copy
/// slices of the source buffer.
#[derive(Debug)]
pub struct Frames {
    message_id: Uuid,
    filename: String,
    data: Bytes,
    chunk_size: usize,
    total: usize,
    next: usize,
}

impl Frames {
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total_chunks(&self) -> usize {
        self.total
    }

    /// Size of the source in bytes.
    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }
}

impl Iterator for Frames {
    type Item = ChunkFrame;

    fn next(&mut self) -> Option<ChunkFrame> {
        if self.next >= self.total {
            return None;
        }

        let index = self.next;
        self.next += 1;

        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.data.len());
        let payload = self.data.slice(start..end);

        Some(ChunkFrame {
            header: ChunkHeader {
                message_id: self.message_id.to_string(),
                filename: self.filename.clone(),
                chunk_index: index,
                total_chunks: self.total,
                timestamp: now_iso8601(),
                chunk_size: payload.len(),
            },
            payload,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames {}

/// Split a byte buffer into frames of at most `chunk_size` payload bytes.
///
/// An empty buffer yields no frames. A `chunk_size` of zero is treated as one.
pub fn frame_bytes(data: impl Into<Bytes>, filename: impl Into<String>, chunk_size: usize) -> Frames {
    let data = data.into();
    let chunk_size = chunk_size.max(1);
    Frames {
        message_id: Uuid::new_v4(),
        filename: filename.into(),
        total: total_chunks(data.len(), chunk_size),
        data,
        chunk_size,
        next: 0,
    }
}

/// Read a file and split it into frames named after the file's base name.
pub async fn frame_file(path: &Path, chunk_size: usize) -> Result<Frames, TransferError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| TransferError::FileAccess {
            path: PathBuf::from(path),
            source,
        })?;

    Ok(frame_bytes(data, base_name(path), chunk_size))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
