//! Length-prefixed framing: 4-byte big-endian length, then the body.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{IpcError, Result};

/// Largest accepted frame body.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Result of reading one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(Vec<u8>),
    /// Peer closed the stream cleanly at a frame boundary.
    Closed,
}

/// Read one frame.
///
/// EOF before the first length byte is an orderly close; EOF anywhere else
/// is an I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ReadOutcome> {
    let mut len_buf = [0u8; 4];
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(ReadOutcome::Closed);
    }
    reader.read_exact(&mut len_buf[1..]).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(ReadOutcome::Frame(body))
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge(body.len()));
    }
    let len = (body.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_in_sequence_then_closed() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();
        drop(client);

        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            ReadOutcome::Frame(b"first".to_vec())
        );
        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            ReadOutcome::Frame(Vec::new())
        );
        assert_eq!(read_frame(&mut server).await.unwrap(), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server).await,
            Err(IpcError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let len = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        client.write_all(&len).await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(IpcError::FrameTooLarge(_))
        ));
    }
}
