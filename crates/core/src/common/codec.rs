//! Little-endian cursor over saved state buffers.

use super::error::StateError;

/// Sequential little-endian reader used by the module list and session decoders.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Number of bytes consumed so far.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Takes the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(StateError::Truncated {
                offset: self.offset,
                wanted: len,
            })?;
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    /// Reads a `u16`.
    pub fn u16(&mut self) -> Result<u16, StateError> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.bytes(2)?);
        Ok(u16::from_le_bytes(raw))
    }

    /// Reads a `u32`.
    pub fn u32(&mut self) -> Result<u32, StateError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads an `i32`.
    pub fn i32(&mut self) -> Result<i32, StateError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(4)?);
        Ok(i32::from_le_bytes(raw))
    }

    /// Reads a non-negative `i32` length or count field.
    pub fn len_field(&mut self) -> Result<usize, StateError> {
        let raw = self.i32()?;
        usize::try_from(raw).map_err(|_| StateError::BadLength(raw))
    }
}
