//! Length-prefixed framing.
//!
//! Every message on the wire is a little-endian `u32` byte count followed by
//! exactly that many payload bytes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const PREFIX_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream between frames.
    #[error("Connection closed")]
    Closed,
    /// The stream ended part-way through a frame.
    #[error("Stream ended mid-frame: expected {expected} bytes, received {received}")]
    Incomplete { expected: usize, received: usize },
    #[error("Payload of {0} bytes does not fit a u32 length prefix")]
    TooLarge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads until `buf` is full or the stream ends, returning the bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Reads one frame and returns its payload. A zero-length payload is valid.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; PREFIX_LEN];
    match read_full(reader, &mut prefix).await? {
        0 => return Err(FrameError::Closed),
        PREFIX_LEN => {}
        received => {
            return Err(FrameError::Incomplete {
                expected: PREFIX_LEN,
                received,
            });
        }
    }

    // The declared length is untrusted, so the buffer only grows as bytes arrive.
    let expected = u32::from_le_bytes(prefix) as usize;
    let mut payload = Vec::new();
    (&mut *reader)
        .take(expected as u64)
        .read_to_end(&mut payload)
        .await?;
    if payload.len() < expected {
        return Err(FrameError::Incomplete {
            expected,
            received: payload.len(),
        });
    }
    Ok(payload)
}

/// Writes one frame in a single buffered write, then flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
