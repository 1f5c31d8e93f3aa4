/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! A growable byte buffer used by all the format writers.
use std::io;

use crate::error::Result;

/// A byte buffer with a doubling growth policy.
///
/// When the buffer has not been allocated yet, exactly the requested room is allocated.
/// Otherwise, when the requested room does not fit, the allocation grows to the larger of
/// `used + requested` or twice the current allocation.
///
/// Allocation failures are reported as [Error::OutOfMemory][crate::error::Error::OutOfMemory].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    allocated: usize
}

impl Buffer {
    pub fn new() -> Self {
        Buffer::default()
    }
    /// Creates a buffer with the given room already allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buf = Buffer::new();
        buf.make_room(capacity)?;
        Ok(buf)
    }
    /// Ensures there is room for `requested` more bytes.
    pub fn make_room(&mut self, requested: usize) -> Result<()> {
        let used = self.data.len();
        let target = if self.allocated == 0 {
            requested
        }
        else if used + requested > self.allocated {
            (used + requested).max(2 * self.allocated)
        }
        else {
            return Ok(())
        };
        self.data.try_reserve_exact(target - used)?;
        self.allocated = target;
        Ok(())
    }
    /// The size of the allocation as determined by the growth policy.
    pub fn capacity(&self) -> usize {
        self.allocated
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
    /// Discards all written bytes keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }
    /// Shortens the buffer to `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.make_room(1)?;
        self.data.push(value);
        Ok(())
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u24_le(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes()[..3])
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.make_room(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }
    /// Overwrites 4 bytes at `offset` with `value` (LSB first).
    ///
    /// # Panics
    /// Panics if `offset + 4` exceeds the length of the written data.
    pub fn patch_u32_le(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Buffer> for Vec<u8> {
    fn from(buf: Buffer) -> Self {
        buf.data
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use super::*;

    #[test]
    fn buffer_growth_works() -> Result<()> {
        let mut buf = Buffer::new();
        assert_eq!(0, buf.capacity());
        buf.make_room(3)?;
        assert_eq!(3, buf.capacity());
        buf.write_bytes(b"abc")?;
        assert_eq!(3, buf.capacity());
        buf.write_u8(1)?;
        assert_eq!(6, buf.capacity());
        buf.write_bytes(&[0;10])?;
        assert_eq!(14, buf.capacity());
        buf.make_room(0)?;
        assert_eq!(14, buf.capacity());
        buf.write_u16_le(0x1234)?;
        assert_eq!(28, buf.capacity());
        assert_eq!(16, buf.len());
        assert_eq!(&[0x34, 0x12], &buf.as_slice()[14..]);
        Ok(())
    }

    #[test]
    fn buffer_writes_work() -> Result<()> {
        let mut buf = Buffer::with_capacity(2)?;
        assert_eq!(2, buf.capacity());
        assert!(buf.is_empty());
        buf.write_u32_le(0)?;
        buf.write_u24_le(0x0A0B0C)?;
        buf.patch_u32_le(0, 0xDEADBEEF);
        buf.write_all(b"!")?;
        assert_eq!(vec![0xEF, 0xBE, 0xAD, 0xDE, 0x0C, 0x0B, 0x0A, b'!'], buf.into_inner());
        Ok(())
    }
}
