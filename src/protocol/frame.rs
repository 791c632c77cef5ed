//! Length-prefixed framing over a reliable byte stream.
//!
//! Each frame is a 4-byte big-endian length `N` followed by `N` payload bytes.
//! The codec never looks inside the payload.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream cleanly between frames.
    #[error("stream closed")]
    Closed,

    /// Stream ended inside a length prefix or frame body.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Declared length is negative or above [`MAX_FRAME_LEN`].
    #[error("invalid frame length: {0}")]
    FrameTooLarge(i64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write one frame and flush.
pub async fn write_frame<W>(stream: &mut W, bytes: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if bytes.len() > MAX_FRAME_LEN {
        return Err(FrameError::FrameTooLarge(bytes.len() as i64));
    }
    let len = bytes.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// The length is validated before any body byte is read, so an oversized
/// prefix never causes an allocation.
pub async fn read_frame<R>(stream: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                FrameError::Closed
            } else {
                FrameError::UnexpectedEof
            });
        }
        filled += n;
    }

    let declared = i32::from_be_bytes(prefix);
    if declared < 0 || declared as usize > MAX_FRAME_LEN {
        return Err(FrameError::FrameTooLarge(declared as i64));
    }

    let mut body = vec![0u8; declared as usize];
    stream.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::UnexpectedEof
        } else {
            FrameError::Io(e)
        }
    })?;
    Ok(body)
}
