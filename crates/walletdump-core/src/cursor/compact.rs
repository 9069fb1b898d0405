//! CompactSize variable-length integer encoding.
//!
//! Bitcoin serialization prefixes vectors and strings with a CompactSize
//! length. The first byte selects the width:
//!
//! - `0x00..=0xFC`: the byte itself is the value
//! - `0xFD`: a little-endian `u16` follows
//! - `0xFE`: a little-endian `u32` follows
//! - `0xFF`: a little-endian `u64` follows

use crate::error::{Error, Result};

/// Prefix announcing a 2-byte value
pub const PREFIX_U16: u8 = 0xFD;
/// Prefix announcing a 4-byte value
pub const PREFIX_U32: u8 = 0xFE;
/// Prefix announcing an 8-byte value
pub const PREFIX_U64: u8 = 0xFF;

/// Decode a CompactSize from the start of `data`.
///
/// Returns the decoded value and the number of bytes consumed. Non-canonical
/// encodings (a wide form used for a small value) are accepted.
pub fn decode_compact_size(data: &[u8]) -> Result<(u64, usize)> {
    let Some(&prefix) = data.first() else {
        return Err(Error::out_of_bounds(0, 1, 0));
    };

    let width = match prefix {
        PREFIX_U16 => 2,
        PREFIX_U32 => 4,
        PREFIX_U64 => 8,
        small => return Ok((small as u64, 1)),
    };

    let body = &data[1..];
    if body.len() < width {
        return Err(Error::out_of_bounds(1, width as u64, body.len()));
    }

    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&body[..width]);
    Ok((u64::from_le_bytes(buf), 1 + width))
}

/// Encode `value` in its canonical (shortest) CompactSize form.
pub fn encode_compact_size(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(PREFIX_U16);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(PREFIX_U32);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(PREFIX_U64);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}
