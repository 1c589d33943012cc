//! Consistent Overhead Byte Stuffing.
//!
//! Removes every [`DELIMITER`](crate::DELIMITER) byte from a buffer so the
//! delimiter can bound frames on the wire. Each block starts with a code byte
//! `1..=255`: the next `code - 1` bytes are literal non-zero data, followed by
//! an implicit zero unless `code == 255`.

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

const MAX_BLOCK_CODE: u8 = 0xFF;

/// Worst-case stuffed length for a payload of `len` bytes.
pub const fn max_stuffed_len(len: usize) -> usize {
    len + len.div_ceil(254) + 1
}

/// Stuff `payload`, appending the result to `dst`.
pub fn stuff_into(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(max_stuffed_len(payload.len()));

    let mut code_index = dst.len();
    dst.put_u8(0);
    let mut code: u8 = 1;

    for &byte in payload {
        if byte == 0 {
            dst[code_index] = code;
            code = 1;
            code_index = dst.len();
            dst.put_u8(0);
        } else {
            dst.put_u8(byte);
            code += 1;
            if code == MAX_BLOCK_CODE {
                dst[code_index] = code;
                code = 1;
                code_index = dst.len();
                dst.put_u8(0);
            }
        }
    }

    dst[code_index] = code;
}

/// Stuff `payload` into a new buffer.
pub fn stuff(payload: &[u8]) -> Vec<u8> {
    let mut dst = BytesMut::with_capacity(max_stuffed_len(payload.len()));
    stuff_into(payload, &mut dst);
    dst.to_vec()
}

/// Reverse [`stuff`].
///
/// Fails on a zero code byte or a block that runs past the end of the input.
pub fn unstuff(stuffed: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(stuffed.len());
    let mut index = 0usize;

    while index < stuffed.len() {
        let offset = index;
        let code = stuffed[index];
        if code == 0 {
            return Err(FrameError::ZeroCode { offset });
        }
        index += 1;

        let end = index + usize::from(code) - 1;
        if end > stuffed.len() {
            return Err(FrameError::Overrun {
                offset,
                code,
                remaining: stuffed.len() - index,
            });
        }
        out.extend_from_slice(&stuffed[index..end]);
        index = end;

        if code < MAX_BLOCK_CODE && index < stuffed.len() {
            out.push(0);
        }
    }

    Ok(out)
}
