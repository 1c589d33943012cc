//! Self-delimiting message framing for device links.
//!
//! Every message travels as one frame:
//! - the payload, serialized by a [`PayloadCodec`] (CBOR by default)
//! - a 2-byte little-endian CRC-16/ARC of the payload
//! - the whole thing COBS-stuffed so it contains no `0x00`
//! - bounded by a `0x00` delimiter on both sides
//!
//! [`FrameFinder`] rebuilds frames from arbitrarily chunked input.

pub mod checksum;
pub mod cobs;
pub mod error;
pub mod finder;
pub mod packet;
pub mod reader;
pub mod wire;
pub mod writer;

pub use checksum::{crc16_arc, Crc16};
pub use cobs::{max_stuffed_len, stuff, stuff_into, unstuff};
pub use error::{FrameError, Result};
pub use finder::FrameFinder;
pub use packet::{
    decode_packet, encode_frame, encode_packet, CborCodec, PacketCodec, PayloadCodec,
};
pub use reader::FrameReader;
pub use wire::{
    check_frame_size, delimit, FrameConfig, CHECKSUM_LEN, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_READ_CHUNK_SIZE, DELIMITER,
};
pub use writer::FrameWriter;
