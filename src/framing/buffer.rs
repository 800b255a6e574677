//! Caller-owned transfer buffer.
//!
//! All reads and writes go through windows handed out by [`TransferBuffer`],
//! so header and content boundaries are plain slice indices and nothing can
//! land past the writable limit.

use std::ops::Range;

use crate::error::{EndpointError, Result};

/// Default transfer buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Bytes at the tail of every buffer that receives never write into.
pub const RESERVED_SLACK: usize = 2;

/// Fixed-capacity byte buffer shared by one receive/send pair.
#[derive(Debug, Clone)]
pub struct TransferBuffer {
    bytes: Box<[u8]>,
}

impl TransferBuffer {
    /// Allocate a zeroed buffer. Capacities not larger than the reserved
    /// slack are bumped so the writable window is never empty.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(RESERVED_SLACK + 1);
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    /// Total capacity, slack included.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// First offset receives may not write to.
    pub fn limit(&self) -> usize {
        self.bytes.len() - RESERVED_SLACK
    }

    /// Writable bytes from `from` to the limit.
    pub fn available(&self, from: usize) -> usize {
        self.limit().saturating_sub(from)
    }

    /// Mutable window `[from, limit)`. Errors when the window would be empty.
    pub fn window_mut(&mut self, from: usize) -> Result<&mut [u8]> {
        let limit = self.limit();
        if from >= limit {
            return Err(EndpointError::OutOfBounds {
                offset: from,
                len: 0,
                capacity: limit,
            });
        }
        Ok(&mut self.bytes[from..limit])
    }

    /// Read-only view of `len` bytes at `offset`.
    pub fn get(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let capacity = self.capacity();
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(&self.bytes[offset..end]),
            _ => Err(EndpointError::OutOfBounds {
                offset,
                len,
                capacity,
            }),
        }
    }

    /// View of a range previously returned by a receive.
    pub fn slice(&self, range: Range<usize>) -> Result<&[u8]> {
        let len = range.end.saturating_sub(range.start);
        self.get(range.start, len)
    }

    /// Copy `data` into the buffer at `offset`, within the writable limit.
    pub fn put(&mut self, offset: usize, data: &[u8]) -> Result<Range<usize>> {
        let limit = self.limit();
        match offset.checked_add(data.len()) {
            Some(end) if end <= limit => {
                self.bytes[offset..end].copy_from_slice(data);
                Ok(offset..end)
            }
            _ => Err(EndpointError::OutOfBounds {
                offset,
                len: data.len(),
                capacity: limit,
            }),
        }
    }
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_stops_before_slack() {
        let mut buf = TransferBuffer::new(64);
        assert_eq!(buf.limit(), 62);
        assert_eq!(buf.window_mut(10).unwrap().len(), 52);
        assert_eq!(buf.available(10), 52);
    }

    #[test]
    fn empty_window_is_rejected() {
        let mut buf = TransferBuffer::new(16);
        assert!(matches!(
            buf.window_mut(14),
            Err(EndpointError::OutOfBounds { offset: 14, .. })
        ));
        assert!(buf.window_mut(100).is_err());
    }

    #[test]
    fn put_and_get() {
        let mut buf = TransferBuffer::new(32);
        let range = buf.put(4, b"hello").unwrap();
        assert_eq!(range, 4..9);
        assert_eq!(buf.slice(range).unwrap(), b"hello");
        assert!(buf.put(28, b"hello").is_err());
        assert!(buf.get(usize::MAX, 2).is_err());
    }

    #[test]
    fn tiny_capacity_keeps_one_writable_byte() {
        let mut buf = TransferBuffer::new(0);
        assert_eq!(buf.window_mut(0).unwrap().len(), 1);
    }
}
