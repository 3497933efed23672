//! JPEG frame splitter
//!
//! Decoders writing MJPEG to a pipe emit back-to-back JPEG images with no
//! framing. Each image starts with an SOI marker (`FF D8`) and ends with an
//! EOI marker (`FF D9`); entropy-coded data stuffs `FF` bytes, so `FF D9`
//! only appears at the end of an image.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::StreamEnded;

/// Start of image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End of image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default upper bound for a single frame (8MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Reads complete JPEG images from a byte stream
#[derive(Debug)]
pub struct JpegReader<R> {
    inner: R,
    buf: BytesMut,
    /// Offset from which to continue searching for EOI
    scan_from: usize,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> JpegReader<R> {
    /// Create a reader with the default frame size limit
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a reader with a custom frame size limit
    pub fn with_max_frame_size(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scan_from: 0,
            max_frame_size,
        }
    }

    /// Read the next complete JPEG image
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn next_frame(&mut self) -> Result<Bytes, StreamEnded> {
        loop {
            if let Some(frame) = self.extract() {
                return Ok(frame);
            }

            if self.buf.len() > self.max_frame_size {
                return Err(StreamEnded::Decode(format!(
                    "no end of image within {} bytes",
                    self.max_frame_size
                )));
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(StreamEnded::Closed);
            }
        }
    }

    /// Cut one complete image out of the buffer, if present
    fn extract(&mut self) -> Option<Bytes> {
        if !self.buf.starts_with(&SOI) {
            match find(&self.buf, SOI, 0) {
                Some(start) => {
                    self.buf.advance(start);
                    self.scan_from = 0;
                }
                None => {
                    // Keep a trailing FF, it may be the first half of SOI
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let len = self.buf.len();
                    self.buf.advance(len - keep);
                    self.scan_from = 0;
                    return None;
                }
            }
        }

        match find(&self.buf, EOI, self.scan_from.max(SOI.len())) {
            Some(end) => {
                self.scan_from = 0;
                Some(self.buf.split_to(end + EOI.len()).freeze())
            }
            None => {
                // Next search starts where a marker split across reads could begin
                self.scan_from = self.buf.len().saturating_sub(1);
                None
            }
        }
    }
}

fn find(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }

    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
