//! Wire-level constants and configuration.
//!
//! ```text
//! ┌──────┬──────────────────────────────────────────┬──────┐
//! │ 0x00 │ COBS( payload ++ crc16_lo ++ crc16_hi )  │ 0x00 │
//! └──────┴──────────────────────────────────────────┴──────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame delimiter. Never appears inside a stuffed frame.
pub const DELIMITER: u8 = 0x00;

/// Default bound on the finder's in-flight buffer, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512;

/// Default size of a single socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4 * 1024;

/// Size of the trailing checksum inside an un-stuffed frame.
pub const CHECKSUM_LEN: usize = 2;

/// Configuration for frame finding and reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Bound on the finder's in-flight buffer. Default: 512 bytes.
    pub max_frame_size: usize,
    /// Bytes requested per read from the underlying stream. Default: 4 KiB.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Bound a stuffed frame with a leading and trailing delimiter.
pub fn delimit(stuffed: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(stuffed.len() + 2);
    out.put_u8(DELIMITER);
    out.put_slice(stuffed);
    out.put_u8(DELIMITER);
    out.freeze()
}

/// Check that a stuffed frame of `stuffed_len` bytes survives a finder
/// bounded at `max_frame_size`.
///
/// The finder buffers the leading delimiter plus the stuffed bytes and
/// discards the frame once that reaches the bound.
pub fn check_frame_size(stuffed_len: usize, max_frame_size: usize) -> Result<()> {
    let size = stuffed_len + 1;
    if size >= max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }
    Ok(())
}
