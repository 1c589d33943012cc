use std::io::{ErrorKind, Write};

use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::packet::{CborCodec, PacketCodec, PayloadCodec};
use crate::wire::{check_frame_size, delimit, FrameConfig};

/// Writes delimited packet frames to any blocking `Write` stream.
pub struct FrameWriter<T, C = CborCodec> {
    inner: T,
    codec: PacketCodec<C>,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self::with_codec(inner, config, PacketCodec::new())
    }
}

impl<T: Write, C: PayloadCodec> FrameWriter<T, C> {
    /// Create a frame writer with an explicit packet codec.
    pub fn with_codec(inner: T, config: FrameConfig, codec: PacketCodec<C>) -> Self {
        Self {
            inner,
            codec,
            config,
        }
    }

    /// Encode and send a packet.
    ///
    /// Frames the receiving finder would discard (stuffed length plus the
    /// leading delimiter reaching `max_frame_size`) are rejected with
    /// `FrameTooLarge` before anything is written.
    pub fn send<P: Serialize + ?Sized>(&mut self, packet: &P) -> Result<()> {
        let stuffed = self.codec.encode(packet)?;
        self.write_frame(&stuffed)
    }

    /// Write an already-stuffed frame, adding both delimiters.
    pub fn write_frame(&mut self, stuffed: &[u8]) -> Result<()> {
        check_frame_size(stuffed.len(), self.config.max_frame_size)?;

        let frame = delimit(stuffed);
        let mut offset = 0usize;
        while offset < frame.len() {
            match self.inner.write(&frame[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
