use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::wire::{DEFAULT_MAX_FRAME_SIZE, DELIMITER};

/// Incremental frame finder.
///
/// Sockets deliver bytes, not frames: a frame may be split across many reads,
/// or several frames may arrive in one read. Feed bytes in arrival order and
/// the finder yields each complete stuffed frame (delimiters stripped), carrying
/// partial state between calls.
///
/// The in-flight buffer never grows past `max_frame_size`. When the bound is
/// reached the partial frame is discarded and the finder waits for the next
/// delimiter.
#[derive(Debug)]
pub struct FrameFinder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameFinder {
    /// Create a finder with the default bound of [`DEFAULT_MAX_FRAME_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a finder with an explicit buffer bound.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_size.min(DEFAULT_MAX_FRAME_SIZE)),
            max_frame_size,
        }
    }

    /// Process one byte; returns a completed stuffed frame if `byte` closed one.
    pub fn push_byte(&mut self, byte: u8) -> Option<Bytes> {
        if self.buf.len() >= self.max_frame_size {
            debug!(
                dropped = self.buf.len(),
                max = self.max_frame_size,
                "frame buffer overflow, discarding partial frame"
            );
            self.buf.clear();
            if byte == DELIMITER {
                self.buf.put_u8(DELIMITER);
            }
            return None;
        }

        if byte == DELIMITER {
            if self.buf.is_empty() {
                self.buf.put_u8(DELIMITER);
                return None;
            }
            let mut frame = self.buf.split();
            frame.advance(1);
            self.buf.put_u8(DELIMITER);
            return Some(frame.freeze());
        }

        if !self.buf.is_empty() {
            self.buf.put_u8(byte);
        }
        None
    }

    /// Process a chunk; returns every frame completed within it, in arrival order.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        chunk
            .iter()
            .filter_map(|&byte| self.push_byte(byte))
            .collect()
    }

    /// Discard any partial frame (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes currently buffered, including the leading delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when a frame start has been seen and bytes are being collected.
    pub fn in_frame(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Configured buffer bound.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}
