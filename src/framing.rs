use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::MAX_FRAME_LEN;

/// Write a length-prefixed frame: 4-byte big-endian length, then the bytes.
/// Zero-length frames are legal.
pub async fn send_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u32(data.len() as u32).await?;
    if !data.is_empty() {
        writer.write_all(data).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. Lengths above 16 MiB are rejected before
/// the body is allocated.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(Error::InvalidFrameSize(len));
    }
    let mut buf = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut buf).await?;
    }
    Ok(buf)
}
