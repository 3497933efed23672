//! Frames broadcast to viewers

use std::time::Instant;

use bytes::Bytes;

/// One encoded frame produced by a camera session
///
/// Cheap to clone: every viewer shares the same `Bytes` allocation.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the session's production order, starting at 1
    pub sequence: u64,
    /// JPEG image data
    pub data: Bytes,
    /// When the frame was read from the upstream
    pub captured_at: Instant,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self {
            sequence,
            data,
            captured_at: Instant::now(),
        }
    }

    /// Size of the encoded image in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
