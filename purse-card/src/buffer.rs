//! Fixed-capacity byte buffer
//!
//! Allocated once at its full size, written at explicit offsets and read
//! through bounds-checked views. Contents are wiped on drop.

use std::fmt;
use std::ops::Range;

use thiserror::Error;
use zeroize::Zeroize;

/// Out-of-range access to a [`FixedBuffer`]
#[derive(Debug, Error, PartialEq, Eq)]
#[error("range {start}..{end} outside buffer of {capacity} bytes")]
pub struct BufferError {
    pub start: usize,
    pub end: usize,
    pub capacity: usize,
}

pub struct FixedBuffer {
    data: Box<[u8]>,
}

impl FixedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn check(&self, start: usize, len: usize) -> Result<Range<usize>, BufferError> {
        let capacity = self.capacity();
        match start.checked_add(len) {
            Some(end) if end <= capacity => Ok(start..end),
            _ => Err(BufferError {
                start,
                end: start.saturating_add(len),
                capacity,
            }),
        }
    }

    /// Copy `bytes` into the buffer starting at `offset`
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        let range = self.check(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn view(&self, offset: usize, len: usize) -> Result<&[u8], BufferError> {
        let range = self.check(offset, len)?;
        Ok(&self.data[range])
    }

    /// Zero the whole buffer
    pub fn wipe(&mut self) {
        self.data.zeroize();
    }
}

impl Drop for FixedBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for FixedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_view() {
        let mut buffer = FixedBuffer::new(8);
        buffer.write_at(2, &[1, 2, 3]).unwrap();
        assert_eq!(buffer.view(0, 6).unwrap(), &[0, 0, 1, 2, 3, 0]);
        assert_eq!(buffer.view(8, 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_bounds() {
        let mut buffer = FixedBuffer::new(8);
        assert_eq!(
            buffer.write_at(6, &[1, 2, 3]),
            Err(BufferError { start: 6, end: 9, capacity: 8 })
        );
        assert!(buffer.view(usize::MAX, 2).is_err());
        // A failed write leaves the contents alone
        assert_eq!(buffer.view(0, 8).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn test_wipe() {
        let mut buffer = FixedBuffer::new(4);
        buffer.write_at(0, &[9, 9, 9, 9]).unwrap();
        buffer.wipe();
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.view(0, 4).unwrap(), &[0u8; 4]);
    }
}
