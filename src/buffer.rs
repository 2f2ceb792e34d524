//! Growable read buffer for frame parsing

use crate::{
    constants::{BUF_CHUNK, MAX_BUFFER_SIZE},
    error::{EslError, EslResult},
};

/// Byte buffer with a read cursor.
///
/// Consumed bytes stay in place until [`compact`](Self::compact) is called so
/// that header and body extraction do not shift memory on every frame.
pub(crate) struct FrameBuffer {
    data: Vec<u8>,
    position: usize,
}

impl FrameBuffer {
    pub(crate) fn new() -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK),
            position: 0,
        }
    }

    /// Unconsumed byte count.
    pub(crate) fn len(&self) -> usize {
        self.data.len() - self.position
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        if self.data.capacity() - self.data.len() < bytes.len() {
            self.data
                .reserve(bytes.len().max(BUF_CHUNK));
        }
        self.data
            .extend_from_slice(bytes);
    }

    pub(crate) fn check_size_limits(&self) -> EslResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol_error(format!(
                "Read buffer holds {} bytes, limit is {}",
                self.len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Take everything before `pattern` and skip past the pattern itself.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let unread = &self.data[self.position..];
        let offset = unread
            .windows(pattern.len())
            .position(|w| w == pattern)?;
        let extracted = unread[..offset].to_vec();
        self.position += offset + pattern.len();
        Some(extracted)
    }

    /// Take exactly `count` bytes, or nothing if fewer are buffered.
    pub(crate) fn extract_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.len() < count {
            return None;
        }
        let start = self.position;
        self.position += count;
        Some(self.data[start..self.position].to_vec())
    }

    /// Drop consumed bytes.
    pub(crate) fn compact(&mut self) {
        if self.position == 0 {
            return;
        }
        self.data
            .drain(..self.position);
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_until_pattern() {
        let mut buf = FrameBuffer::new();
        buf.extend_from_slice(b"A: 1\nB: 2\n\nrest");
        assert_eq!(
            buf.extract_until_pattern(b"\n\n"),
            Some(b"A: 1\nB: 2".to_vec())
        );
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.extract_until_pattern(b"\n\n"), None);
    }

    #[test]
    fn test_extract_bytes_waits_for_enough_data() {
        let mut buf = FrameBuffer::new();
        buf.extend_from_slice(b"abc");
        assert_eq!(buf.extract_bytes(5), None);
        buf.extend_from_slice(b"de");
        assert_eq!(buf.extract_bytes(5), Some(b"abcde".to_vec()));
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_compact_keeps_unread_bytes() {
        let mut buf = FrameBuffer::new();
        buf.extend_from_slice(b"xx\n\nyy");
        buf.extract_until_pattern(b"\n\n");
        buf.compact();
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.extract_bytes(2), Some(b"yy".to_vec()));
    }
}
