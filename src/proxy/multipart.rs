//! Multipart "replace" framing and JPEG picture splitting

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Part boundary marker
pub const BOUNDARY: &str = "frame";

/// Response content type for re-framed streams
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Wrap one JPEG picture as a multipart part
pub fn part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut out = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    out.put_slice(header.as_bytes());
    out.put_slice(jpeg);
    out.put_slice(b"\r\n");
    out.freeze()
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Splits a concatenated JPEG byte stream into whole pictures
#[derive(Debug)]
pub struct JpegSplitter {
    buf: Vec<u8>,
    /// Offset up to which the current picture was searched for EOI
    scanned: usize,
    max_frame: usize,
}

impl JpegSplitter {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 2,
            max_frame,
        }
    }

    /// Feed bytes, returning every picture completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find(&self.buf, &SOI, 0) else {
                // A trailing 0xFF may be the first half of the next SOI
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                self.scanned = 2;
                break;
            };
            if start > 0 {
                self.buf.drain(..start);
                self.scanned = 2;
            }

            match find(&self.buf, &EOI, self.scanned) {
                Some(end) => {
                    let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
                    frames.push(Bytes::from(frame));
                    self.scanned = 2;
                }
                None => {
                    if self.buf.len() > self.max_frame {
                        warn!("Discarding oversized picture ({} bytes)", self.buf.len());
                        self.buf.clear();
                        self.scanned = 2;
                    } else {
                        self.scanned = self.buf.len().saturating_sub(1).max(2);
                    }
                    break;
                }
            }
        }

        frames
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = SOI.to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(&EOI);
        out
    }

    #[test]
    fn test_part_layout() {
        let framed = part(b"abc");
        assert_eq!(
            &framed[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\nabc\r\n"
        );
    }

    #[test]
    fn test_splits_back_to_back_pictures() {
        let mut stream = jpeg(b"one");
        stream.extend(jpeg(b"two"));

        let mut splitter = JpegSplitter::new(1024);
        let frames = splitter.push(&stream);
        assert_eq!(frames, vec![Bytes::from(jpeg(b"one")), Bytes::from(jpeg(b"two"))]);
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn test_markers_split_across_chunks() {
        let picture = jpeg(b"payload");
        let mut splitter = JpegSplitter::new(1024);

        let mut frames = Vec::new();
        for byte in &picture {
            frames.extend(splitter.push(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, vec![Bytes::from(picture)]);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut stream = b"noise".to_vec();
        stream.extend(jpeg(b"x"));
        let frames = JpegSplitter::new(1024).push(&stream);
        assert_eq!(frames, vec![Bytes::from(jpeg(b"x"))]);
    }

    #[test]
    fn test_oversized_picture_is_dropped() {
        let mut splitter = JpegSplitter::new(16);
        let mut partial = SOI.to_vec();
        partial.extend(vec![0u8; 32]);
        assert!(splitter.push(&partial).is_empty());
        assert_eq!(splitter.buffered(), 0);

        assert_eq!(splitter.push(&jpeg(b"ok")), vec![Bytes::from(jpeg(b"ok"))]);
    }
}
