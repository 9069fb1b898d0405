//! Bounds-checked reading of Bitcoin-serialized byte buffers.
//!
//! [`ByteCursor`] walks an immutable slice front to back. Every read checks
//! the remaining length before touching the buffer and fails with
//! [`Error::OutOfBounds`] instead of panicking.
//!
//! Once a read has failed the cursor position is unspecified. Callers treat
//! the cursor as spent and abandon the record they were decoding.

mod compact;

use crate::error::{Error, Result};

pub use compact::{decode_compact_size, encode_compact_size, PREFIX_U16, PREFIX_U32, PREFIX_U64};

/// Bounds-checked reader over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Creates a cursor positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        if offset > data.len() {
            return Err(Error::out_of_bounds(0, offset as u64, data.len()));
        }
        Ok(Self {
            data,
            position: offset,
        })
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns true once every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `len` bytes without copying
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::out_of_bounds(
                self.position,
                len as u64,
                self.remaining(),
            ));
        }
        let start = self.position;
        self.position += len;
        Ok(&self.data[start..self.position])
    }

    /// Copy the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.read_slice(len).map(<[u8]>::to_vec)
    }

    /// Skip `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_slice(N)?);
        Ok(buf)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian `u16`
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian `u32`
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian `u64`
    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read a big-endian `u16`
    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    /// Read a big-endian `u32`
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    /// Read a CompactSize-encoded unsigned integer
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let start = self.position;
        let (value, len) = decode_compact_size(&self.data[start..]).map_err(|e| match e {
            Error::OutOfBounds {
                offset,
                needed,
                available,
            } => Error::out_of_bounds(start + offset, needed, available),
            other => other,
        })?;
        self.position += len;
        Ok(value)
    }

    /// Read a CompactSize length followed by that many bytes.
    ///
    /// Lengths above `max_len` are rejected before any allocation; lengths
    /// that fit the cap but not the buffer fail with [`Error::OutOfBounds`].
    pub fn read_length_prefixed(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let prefix_offset = self.position;
        let declared = self.read_compact_size()?;
        if declared > max_len as u64 {
            return Err(Error::LengthLimit {
                offset: prefix_offset,
                declared,
                max: max_len,
            });
        }
        if declared > self.remaining() as u64 {
            return Err(Error::out_of_bounds(
                self.position,
                declared,
                self.remaining(),
            ));
        }
        self.read_bytes(declared as usize)
    }

    /// Read a length-prefixed string, replacing invalid UTF-8 sequences
    pub fn read_length_prefixed_string(&mut self, max_len: usize) -> Result<String> {
        let bytes = self.read_length_prefixed(max_len)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 1, 0, 0, 0, 0, 0, 0, 0];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(cursor.read_u64_le().unwrap(), 1);
        assert!(cursor.is_empty());
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn test_short_fixed_read_fails() {
        let mut cursor = ByteCursor::new(&[1, 2, 3]);
        let err = cursor.read_u32_le().unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 0,
                needed: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn test_compact_size_advances() {
        let data = [0xFD, 0x00, 0x01, 0x07];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_compact_size().unwrap(), 256);
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.read_compact_size().unwrap(), 7);
        assert!(cursor.read_compact_size().is_err());
    }

    #[test]
    fn test_compact_size_error_offset() {
        let data = [0x01, 0xFE, 0x00];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(1).unwrap();
        match cursor.read_compact_size().unwrap_err() {
            Error::OutOfBounds { offset, needed, .. } => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_length_prefixed() {
        let data = [0x03, b'a', b'b', b'c', 0x00];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_length_prefixed(16).unwrap(), b"abc");
        assert_eq!(cursor.read_length_prefixed(16).unwrap(), b"");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_length_prefixed_past_end() {
        let data = [0x05, 1, 2];
        let mut cursor = ByteCursor::new(&data);
        let err = cursor.read_length_prefixed(1024).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                needed: 5,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_length_prefixed_over_cap() {
        // Claims 2^32 bytes; must be rejected before allocating
        let data = [0xFF, 0, 0, 0, 0, 1, 0, 0, 0];
        let mut cursor = ByteCursor::new(&data);
        let err = cursor.read_length_prefixed(1024).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthLimit {
                offset: 0,
                declared: 4_294_967_296,
                max: 1024
            }
        ));
        assert!(err.is_validation());
    }

    #[test]
    fn test_length_prefixed_string_lossy() {
        let data = [0x03, b'o', 0xFF, b'k'];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(
            cursor.read_length_prefixed_string(16).unwrap(),
            "o\u{FFFD}k"
        );
    }

    #[test]
    fn test_at_offset() {
        let data = [0, 0, 0x00, 0x00, 0x01, 0x00];
        let mut cursor = ByteCursor::at(&data, 2).unwrap();
        assert_eq!(cursor.read_u32_be().unwrap(), 0x100);
        assert!(ByteCursor::at(&data, 7).is_err());
        assert!(ByteCursor::at(&data, 6).unwrap().is_empty());
    }
}
