//! Length-prefixed framing shared by the stream transport and test servers
//!
//! Every frame is a 4-byte little-endian payload length followed by the
//! payload. The first frame in each direction is the handshake.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{AppError, AppResult, ErrorContextExt};

const LENGTH_PREFIX: usize = 4;

/// Handshake frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandshakeMessage {
    Hello { protocols: Vec<String>, client: String },
    Welcome { protocol: String },
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], endpoint: &str) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let length = u32::try_from(payload.len()).map_err(|_| AppError::FrameTooLarge {
        size: payload.len(),
        limit: u32::MAX as usize,
    })?;

    writer
        .write_all(&length.to_le_bytes())
        .await
        .on_endpoint(endpoint, "write frame length")?;
    writer.write_all(payload).await.on_endpoint(endpoint, "write frame payload")?;
    writer.flush().await.on_endpoint(endpoint, "flush frame")?;
    Ok(())
}

/// Read one frame
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
/// A close in the middle of a frame is an error.
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize, endpoint: &str) -> AppResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        let n = reader
            .read(&mut length_bytes[filled..])
            .await
            .on_endpoint(endpoint, "read frame length")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(AppError::transport(endpoint, "stream closed inside frame header"));
        }
        filled += n;
    }

    let length = u32::from_le_bytes(length_bytes) as usize;
    if length > max_frame_bytes {
        return Err(AppError::FrameTooLarge {
            size: length,
            limit: max_frame_bytes,
        });
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .on_endpoint(endpoint, "read frame payload")?;
    Ok(Some(payload))
}
