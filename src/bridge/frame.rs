//! Frame accumulation and the terminator heuristic.
//!
//! The emulator does not length-prefix its messages. A frame is considered
//! complete when the chunk that was *just received* either ends with the
//! byte `130` or is exactly `\r\n`. Only the most recent chunk is inspected:
//! a `130` that landed mid-buffer in an earlier chunk does not complete a
//! frame, and neither does a longer chunk that happens to end in `\r\n`.

use bytes::{Bytes, BytesMut};

/// Byte value that marks the end of a frame when it is the last byte of a chunk.
pub const TERMINATOR_BYTE: u8 = 130;

/// A chunk consisting of exactly these bytes also ends a frame.
pub const TERMINATOR_LINE: &[u8] = b"\r\n";

/// Default upper bound for a single receive call.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Returns true if `chunk` completes the frame it belongs to.
pub fn is_terminator(chunk: &[u8]) -> bool {
    chunk.last() == Some(&TERMINATOR_BYTE) || chunk == TERMINATOR_LINE
}

/// A logically complete (or abandoned) unit of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Every byte received for this frame, terminator included.
    pub bytes: Bytes,
    /// False when the run-time budget elapsed before a terminator arrived.
    pub is_complete: bool,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Growing buffer for the frame currently being received.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    incoming: BytesMut,
}

impl FrameAccumulator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            incoming: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a chunk and report whether it terminated the frame.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.incoming.extend_from_slice(chunk);
        is_terminator(chunk)
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        self.incoming.clear();
    }

    /// Hand off everything accumulated and start over empty.
    pub fn finish(&mut self, is_complete: bool) -> Frame {
        Frame {
            bytes: self.incoming.split().freeze(),
            is_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_byte_last() {
        let mut chunk = vec![b'x'; 9];
        chunk.push(TERMINATOR_BYTE);
        assert!(is_terminator(&chunk));
        assert!(is_terminator(&[TERMINATOR_BYTE]));
    }

    #[test]
    fn test_terminator_byte_not_last() {
        assert!(!is_terminator(&[TERMINATOR_BYTE, b'a']));
    }

    #[test]
    fn test_crlf_only_when_whole_chunk() {
        assert!(is_terminator(b"\r\n"));
        assert!(!is_terminator(b"world\r\n"));
        assert!(!is_terminator(b"\r\n\r\n"));
        assert!(!is_terminator(b"\n"));
        assert!(!is_terminator(b""));
    }

    #[test]
    fn test_completes_after_terminating_chunk_not_before() {
        let mut acc = FrameAccumulator::default();
        assert!(!acc.push(b"12"));
        assert!(!acc.push(b"34"));
        assert!(acc.push(&[b'5', TERMINATOR_BYTE]));

        let frame = acc.finish(true);
        assert_eq!(&frame.bytes[..], &[b'1', b'2', b'3', b'4', b'5', TERMINATOR_BYTE]);
        assert!(frame.is_complete);
        assert_eq!(acc.len(), 0);
    }

    #[test]
    fn test_earlier_terminator_byte_is_ignored() {
        // 130 mid-buffer from an earlier chunk must not complete the frame
        let mut acc = FrameAccumulator::default();
        assert!(!acc.push(&[TERMINATOR_BYTE, b'a']));
        assert!(!acc.push(b"bc"));
        assert_eq!(acc.len(), 4);
    }

    #[test]
    fn test_crlf_split_across_chunks_does_not_complete() {
        let mut acc = FrameAccumulator::default();
        assert!(!acc.push(b"hello\r"));
        assert!(!acc.push(b"\nworld"));
        assert!(acc.push(b"\r\n"));
        assert_eq!(&acc.finish(true).bytes[..], b"hello\r\nworld\r\n");
    }

    #[test]
    fn test_concatenation_preserved_without_terminator() {
        let chunks: [&[u8]; 4] = [b"alpha", b"\r\n\r\n", b"be\rta", b"\n"];
        let mut acc = FrameAccumulator::default();
        for chunk in chunks {
            assert!(!acc.push(chunk));
        }
        let frame = acc.finish(false);
        assert_eq!(&frame.bytes[..], b"alpha\r\n\r\nbe\rta\n");
        assert!(!frame.is_complete);
    }

    #[test]
    fn test_reset_discards_partial() {
        let mut acc = FrameAccumulator::default();
        acc.push(b"partial");
        acc.reset();
        assert_eq!(acc.len(), 0);
        assert!(acc.push(b"\r\n"));
        assert_eq!(&acc.finish(true).bytes[..], b"\r\n");
    }
}
