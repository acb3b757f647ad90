//! Length-prefixed DNS framing for stream transports (TCP and TLS).
//!
//! Every message is preceded by its length as a big-endian `u16`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum DNS message size over a stream transport.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Read one framed message.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new
/// length prefix.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let len = usize::from(u16::from_be_bytes(len_buf));
    let mut message = vec![0u8; len];
    reader.read_exact(&mut message).await?;
    Ok(Some(message))
}

/// Write one framed message and flush it.
pub async fn write_frame<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("DNS message too large for TCP framing: {} bytes", message.len()),
        )
    })?;

    let mut frame = Vec::with_capacity(message.len() + 2);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);
    writer.write_all(&frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_write_length_prefix() {
        let mut out = Vec::new();
        write_frame(&mut out, &[0xAB, 0xCD, 0xEF]).await.unwrap();

        assert_eq!(out, vec![0x00, 0x03, 0xAB, 0xCD, 0xEF]);
    }

    #[tokio::test]
    async fn should_read_consecutive_frames() {
        let data: &[u8] = &[0x00, 0x01, 0x11, 0x00, 0x02, 0x22, 0x33];
        let mut reader = data;

        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(vec![0x11]));
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(vec![0x22, 0x33]));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_fail_on_truncated_body() {
        let data: &[u8] = &[0x00, 0x05, 0x11];
        let mut reader = data;

        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn should_reject_oversized_message() {
        let mut out = Vec::new();
        let message = vec![0u8; MAX_FRAME_SIZE + 1];

        let err = write_frame(&mut out, &message).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }
}
