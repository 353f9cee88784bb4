//! Minimal Ogg page reader: enough to pull Opus packets off the capture
//! pipeline's audio pipe one page at a time.
//!
//! Ogg page layout: `"OggS"` capture pattern, version, header type flags,
//! granule position (8 bytes), serial number, page sequence, checksum
//! (27 bytes fixed header total), a page-segment count byte, that many
//! segment-size bytes, then the concatenated segment payloads.

use tokio::io::{AsyncRead, AsyncReadExt};

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const FIXED_HEADER_LEN: usize = 27;

pub struct OggReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> OggReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next page's payload (the concatenation of all its
    /// segments), or `None` on clean EOF.
    pub async fn next_page(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut capture = [0u8; 4];
        match self.inner.read_exact(&mut capture).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        if &capture != CAPTURE_PATTERN {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad ogg capture pattern"));
        }

        let mut rest_of_fixed = [0u8; FIXED_HEADER_LEN - 4];
        self.inner.read_exact(&mut rest_of_fixed).await?;

        let segment_count = rest_of_fixed[FIXED_HEADER_LEN - 4 - 1] as usize;
        let mut segment_table = vec![0u8; segment_count];
        self.inner.read_exact(&mut segment_table).await?;

        let total: usize = segment_table.iter().map(|&b| b as usize).sum();
        let mut payload = vec![0u8; total];
        self.inner.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_page(segments: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(CAPTURE_PATTERN);
        buf.push(0); // version
        buf.push(0); // header type
        buf.extend_from_slice(&0u64.to_le_bytes()); // granule position
        buf.extend_from_slice(&1u32.to_le_bytes()); // serial number
        buf.extend_from_slice(&0u32.to_le_bytes()); // page sequence
        buf.extend_from_slice(&0u32.to_le_bytes()); // checksum
        buf.push(segments.len() as u8);
        for s in segments {
            buf.push(s.len() as u8);
        }
        for s in segments {
            buf.extend_from_slice(s);
        }
        buf
    }

    #[tokio::test]
    async fn reads_one_page_then_eof() {
        let data = build_page(&[&[1, 2], &[3, 4, 5]]);
        let mut reader = OggReader::new(std::io::Cursor::new(data));
        let page = reader.next_page().await.unwrap().unwrap();
        assert_eq!(page, vec![1, 2, 3, 4, 5]);
        assert_eq!(reader.next_page().await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_capture_pattern_errors() {
        let mut reader = OggReader::new(std::io::Cursor::new(b"NOPE".to_vec()));
        assert!(reader.next_page().await.is_err());
    }
}
