/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A COBS block started with a zero code byte.
    #[error("invalid stuffing: zero code byte at offset {offset}")]
    ZeroCode { offset: usize },

    /// A COBS block claims more bytes than remain in the frame.
    #[error("invalid stuffing: block at offset {offset} claims {code} bytes, {remaining} remain")]
    Overrun {
        offset: usize,
        code: u8,
        remaining: usize,
    },

    /// The un-stuffed frame is too short to carry a checksum.
    #[error("frame too small ({len} bytes, need at least 2 for the checksum)")]
    TooSmall { len: usize },

    /// The received checksum does not match the payload.
    #[error("checksum mismatch (received {received:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { received: u16, computed: u16 },

    /// The payload codec failed to serialize or deserialize a value.
    #[error("payload codec error: {0}")]
    Payload(String),

    /// A frame exceeded the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
