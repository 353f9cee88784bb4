//! Minimal IVF container reader: just enough to pull VP8 frames one at a
//! time off the capture pipeline's video pipe.
//!
//! IVF layout: a 32-byte file header, then a run of frames, each a
//! 12-byte frame header (4-byte little-endian payload size, 8-byte
//! timestamp) followed by that many payload bytes.

use tokio::io::{AsyncRead, AsyncReadExt};

const FILE_HEADER_LEN: usize = 32;
const FRAME_HEADER_LEN: usize = 12;

pub struct IvfReader<R> {
    inner: R,
    header_consumed: bool,
}

impl<R: AsyncRead + Unpin> IvfReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, header_consumed: false }
    }

    async fn consume_file_header(&mut self) -> std::io::Result<()> {
        if self.header_consumed {
            return Ok(());
        }
        let mut header = [0u8; FILE_HEADER_LEN];
        self.inner.read_exact(&mut header).await?;
        self.header_consumed = true;
        Ok(())
    }

    /// Reads the next frame's payload, or `None` on clean EOF.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        self.consume_file_header().await?;

        let mut frame_header = [0u8; FRAME_HEADER_LEN];
        match self.inner.read_exact(&mut frame_header).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let size = u32::from_le_bytes(frame_header[0..4].try_into().unwrap()) as usize;
        let mut payload = vec![0u8; size];
        self.inner.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ivf(frames: &[&[u8]]) -> Vec<u8> {
        let mut buf = vec![0u8; FILE_HEADER_LEN];
        for (i, frame) in frames.iter().enumerate() {
            buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(i as u64).to_le_bytes());
            buf.extend_from_slice(frame);
        }
        buf
    }

    #[tokio::test]
    async fn reads_frames_in_order_then_eof() {
        let data = build_ivf(&[&[1, 2, 3], &[4, 5]]);
        let mut reader = IvfReader::new(std::io::Cursor::new(data));
        assert_eq!(reader.next_frame().await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(reader.next_frame().await.unwrap(), Some(vec![4, 5]));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }
}
