use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::checksum::crc16_arc;
use crate::cobs::{max_stuffed_len, stuff_into, unstuff};
use crate::error::{FrameError, Result};
use crate::wire::{delimit, CHECKSUM_LEN};

/// Serializes packet values to payload bytes and back.
///
/// The packet codec is generic over this so the payload encoding can be
/// backed by something other than the in-process CBOR codec without changing
/// the packet-level interface.
pub trait PayloadCodec {
    /// Serialize `value` to payload bytes.
    fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from payload bytes.
    fn from_slice<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// CBOR payload codec.
///
/// Unsigned 64-bit integers round-trip exactly; floats are written in the
/// shortest lossless width and half/single/double precision are all accepted
/// on decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl PayloadCodec for CborCodec {
    fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out)
            .map_err(|err| FrameError::Payload(format!("encode: {err}")))?;
        Ok(out)
    }

    fn from_slice<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        ciborium::from_reader(bytes).map_err(|err| FrameError::Payload(format!("decode: {err}")))
    }
}

/// Packet encoder/decoder: payload codec + CRC-16/ARC + COBS.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec<C = CborCodec> {
    payload: C,
}

impl PacketCodec<CborCodec> {
    /// Packet codec backed by CBOR.
    pub fn new() -> Self {
        Self { payload: CborCodec }
    }
}

impl<C: PayloadCodec> PacketCodec<C> {
    /// Packet codec backed by an explicit payload codec.
    pub fn with_payload_codec(payload: C) -> Self {
        Self { payload }
    }

    /// Encode `value` as a stuffed frame, without delimiters.
    ///
    /// ```text
    /// COBS( payload(value) ++ crc16_lo ++ crc16_hi )
    /// ```
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        let mut raw = self.payload.to_vec(value)?;
        let crc = crc16_arc(&raw);
        raw.extend_from_slice(&crc.to_le_bytes());

        let mut dst = BytesMut::with_capacity(max_stuffed_len(raw.len()));
        stuff_into(&raw, &mut dst);
        Ok(dst.freeze())
    }

    /// Encode `value` as a complete wire frame, delimiters included.
    pub fn encode_frame<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        let stuffed = self.encode(value)?;
        Ok(delimit(&stuffed))
    }

    /// Decode a stuffed frame (delimiters already stripped).
    pub fn decode<T: DeserializeOwned>(&self, stuffed: &[u8]) -> Result<T> {
        let raw = unstuff(stuffed)?;
        if raw.len() < CHECKSUM_LEN {
            return Err(FrameError::TooSmall { len: raw.len() });
        }

        let (payload, crc_bytes) = raw.split_at(raw.len() - CHECKSUM_LEN);
        let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        let computed = crc16_arc(payload);
        if received != computed {
            return Err(FrameError::ChecksumMismatch { received, computed });
        }

        self.payload.from_slice(payload)
    }

    /// The payload codec in use.
    pub fn payload_codec(&self) -> &C {
        &self.payload
    }
}

/// Encode `value` with the default CBOR packet codec (no delimiters).
pub fn encode_packet<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    PacketCodec::new().encode(value)
}

/// Encode `value` with the default CBOR packet codec, delimiters included.
pub fn encode_frame<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    PacketCodec::new().encode_frame(value)
}

/// Decode a stuffed frame with the default CBOR packet codec.
pub fn decode_packet<T: DeserializeOwned>(stuffed: &[u8]) -> Result<T> {
    PacketCodec::new().decode(stuffed)
}
