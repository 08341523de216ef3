//! Receiver-side reassembly of chunked transfers.
//!
//! Frames may arrive more than once (at-least-once delivery); duplicates of
//! an already stored index are ignored. Headers are untrusted: the declared
//! chunk count is capped, and the oldest partial transfer is evicted once too
//! many are open.

use std::collections::{HashMap, VecDeque};

use bytes::{Bytes, BytesMut};

use tracing::warn;

use super::{ChunkFrame, FrameError};

/// Default cap on `total_chunks` (about 6.4 GiB at 100 KiB chunks).
pub const DEFAULT_MAX_CHUNKS: usize = 1 << 16;
/// Default number of partial transfers kept at once.
pub const DEFAULT_MAX_PENDING: usize = 16;

/// A fully received file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFile {
    pub message_id: String,
    pub filename: String,
    pub data: Bytes,
}

#[derive(Debug)]
struct PartialTransfer {
    filename: String,
    chunks: Vec<Option<Bytes>>,
    received: usize,
}

/// Collects frames per `message_id` until each transfer is complete.
#[derive(Debug)]
pub struct Reassembler {
    transfers: HashMap<String, PartialTransfer>,
    /// Open transfers, oldest first.
    order: VecDeque<String>,
    max_chunks: usize,
    max_pending: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_CHUNKS, DEFAULT_MAX_PENDING)
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_chunks: usize, max_pending: usize) -> Self {
        Self {
            transfers: HashMap::new(),
            order: VecDeque::new(),
            max_chunks,
            max_pending: max_pending.max(1),
        }
    }

    /// Number of transfers with frames still outstanding.
    pub fn pending(&self) -> usize {
        self.transfers.len()
    }

    /// Store a frame; returns the file once its last missing chunk arrives.
    pub fn push(&mut self, frame: ChunkFrame) -> Result<Option<CompletedFile>, FrameError> {
        let header = frame.header;

        if header.chunk_index >= header.total_chunks {
            return Err(FrameError::IndexOutOfRange {
                chunk_index: header.chunk_index,
                total_chunks: header.total_chunks,
            });
        }

        if header.total_chunks > self.max_chunks {
            return Err(FrameError::TooManyChunks {
                total_chunks: header.total_chunks,
                limit: self.max_chunks,
            });
        }

        if !self.transfers.contains_key(&header.message_id) {
            if self.transfers.len() >= self.max_pending {
                if let Some(oldest) = self.order.pop_front() {
                    self.transfers.remove(&oldest);
                    warn!(message_id = %oldest, "Evicting incomplete transfer");
                }
            }
            self.order.push_back(header.message_id.clone());
        }

        let transfer = self
            .transfers
            .entry(header.message_id.clone())
            .or_insert_with(|| PartialTransfer {
                filename: header.filename.clone(),
                chunks: vec![None; header.total_chunks],
                received: 0,
            });

        if transfer.chunks.len() != header.total_chunks {
            return Err(FrameError::TotalMismatch {
                message_id: header.message_id,
                expected: transfer.chunks.len(),
                actual: header.total_chunks,
            });
        }

        let slot = &mut transfer.chunks[header.chunk_index];
        if slot.is_none() {
            *slot = Some(frame.payload);
            transfer.received += 1;
        }

        if transfer.received < transfer.chunks.len() {
            return Ok(None);
        }

        let Some(done) = self.transfers.remove(&header.message_id) else {
            return Ok(None);
        };
        self.order.retain(|id| *id != header.message_id);

        let size = done.chunks.iter().flatten().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(size);
        for chunk in done.chunks.into_iter().flatten() {
            data.extend_from_slice(&chunk);
        }

        Ok(Some(CompletedFile {
            message_id: header.message_id,
            filename: done.filename,
            data: data.freeze(),
        }))
    }
}
