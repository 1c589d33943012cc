use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{FrameError, Result};
use crate::finder::FrameFinder;
use crate::packet::{CborCodec, PacketCodec, PayloadCodec};
use crate::wire::FrameConfig;

/// Reads packets from any blocking `Read` stream (a capture file, stdin, a
/// serial port).
///
/// Handles partial reads internally. Empty frames between adjacent
/// delimiters are skipped.
pub struct FrameReader<T, C = CborCodec> {
    inner: T,
    finder: FrameFinder,
    pending: VecDeque<Bytes>,
    codec: PacketCodec<C>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self::with_codec(inner, config, PacketCodec::new())
    }
}

impl<T: Read, C: PayloadCodec> FrameReader<T, C> {
    /// Create a frame reader with an explicit packet codec.
    pub fn with_codec(inner: T, config: FrameConfig, codec: PacketCodec<C>) -> Self {
        Self {
            inner,
            finder: FrameFinder::with_max_frame_size(config.max_frame_size),
            pending: VecDeque::new(),
            codec,
            config,
        }
    }

    /// Read the next non-empty stuffed frame (blocking), delimiters stripped.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// partial frame at EOF is discarded.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        loop {
            while let Some(frame) = self.pending.pop_front() {
                if !frame.is_empty() {
                    return Ok(frame);
                }
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.pending.extend(self.finder.push_bytes(&chunk[..read]));
        }
    }

    /// Read and decode the next frame.
    ///
    /// A frame that fails to decode is consumed and its error returned; the
    /// reader stays usable for the frames that follow.
    pub fn read_packet<P: DeserializeOwned>(&mut self) -> Result<P> {
        let frame = self.read_frame()?;
        self.codec.decode(&frame)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
