//! Length-delimited frame I/O over any async byte stream.
//!
//! Every message on the wire is a 4-byte big-endian length prefix followed by
//! the packet blob. The same framing is reused by the session save format,
//! which is why the limit and layout live here rather than inside the TCP
//! plumbing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed frame size (16 MB). Protects against unbounded allocation
/// from malformed or hostile length prefixes. Full-map pushes and PNG assets
/// are the largest expected frames; 16 MB is generous headroom.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Writes one frame: 4-byte big-endian length, then the payload.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = payload.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame: 4-byte big-endian length, then the payload.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame and
/// `InvalidData` if the length prefix exceeds [`MAX_FRAME_SIZE`].
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_single_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello, table!").await.unwrap();

        let frame = read_frame(&mut b).await.unwrap();
        assert_eq!(frame, b"hello, table!");
    }

    #[tokio::test]
    async fn test_roundtrip_empty_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"").await.unwrap();

        let frame = read_frame(&mut b).await.unwrap();
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_frames_in_sequence() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        for msg in [b"first".as_slice(), b"second", b"third"] {
            write_frame(&mut a, msg).await.unwrap();
        }

        for expected in [b"first".as_slice(), b"second", b"third"] {
            let frame = read_frame(&mut b).await.unwrap();
            assert_eq!(frame, expected);
        }
    }

    #[tokio::test]
    async fn test_rejects_oversized_write() {
        let (mut a, _b) = tokio::io::duplex(64);
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];
        let err = write_frame(&mut a, &big).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_rejects_oversized_length_prefix() {
        let (mut a, mut b) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        a.write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_eof_mid_prefix() {
        let (mut a, mut b) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        a.write_all(&[0u8, 1]).await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_eof_mid_payload() {
        let (mut a, mut b) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        a.write_all(&8u32.to_be_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
