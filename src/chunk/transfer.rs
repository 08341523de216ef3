//! Ordered, acknowledged publishing of a file's frames.
//!
//! Frames go out strictly in index order, one publish per frame, and the
//! next frame is only sent after the previous one was acknowledged. The
//! first failed publish aborts the rest of the transfer; the failed frame is
//! not retried.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use super::{frame_file, FrameError};
use crate::bus::{AckLevel, BusError, Publisher};

/// Errors that abort a single file transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Cannot read '{}': {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Chunk {chunk_index} of {total_chunks} for '{filename}' failed: {source}")]
    Publish {
        filename: String,
        chunk_index: usize,
        total_chunks: usize,
        #[source]
        source: BusError,
    },

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] FrameError),
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub message_id: Uuid,
    pub filename: String,
    pub total_chunks: usize,
    pub bytes_sent: usize,
}

impl TransferReport {
    /// True if the source was empty and nothing was published.
    pub fn is_empty(&self) -> bool {
        self.total_chunks == 0
    }
}

/// Frame the file at `path` and publish every frame to `channel` in order.
///
/// An empty file publishes nothing and reports zero chunks.
pub async fn send_file(
    publisher: &dyn Publisher,
    channel: &str,
    path: &Path,
    chunk_size: usize,
    ack: AckLevel,
) -> Result<TransferReport, TransferError> {
    let frames = frame_file(path, chunk_size).await?;

    let message_id = frames.message_id();
    let filename = frames.filename().to_string();
    let total_chunks = frames.total_chunks();

    if total_chunks == 0 {
        info!(file = %filename, "Skipping empty file transfer");
        return Ok(TransferReport {
            message_id,
            filename,
            total_chunks,
            bytes_sent: 0,
        });
    }

    info!(
        file = %filename,
        message_id = %message_id,
        bytes = frames.total_bytes(),
        chunks = total_chunks,
        "Sending file"
    );

    let mut bytes_sent = 0;
    for frame in frames {
        let chunk_index = frame.header.chunk_index;
        let chunk_bytes = frame.payload.len();
        let wire = frame.encode()?;

        publisher
            .publish(channel, wire, ack)
            .await
            .map_err(|source| TransferError::Publish {
                filename: filename.clone(),
                chunk_index,
                total_chunks,
                source,
            })?;

        bytes_sent += chunk_bytes;
        debug!(
            message_id = %message_id,
            chunk_index,
            total_chunks,
            "Chunk acknowledged"
        );
    }

    info!(file = %filename, message_id = %message_id, "File transfer complete");

    Ok(TransferReport {
        message_id,
        filename,
        total_chunks,
        bytes_sent,
    })
}
