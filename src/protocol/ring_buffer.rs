//! Fixed-capacity byte ring buffer.
//!
//! Backs stream reassembly: raw socket reads are appended at the tail and
//! complete frames are peeked and consumed from the head. Capacity can be
//! changed at any time as long as buffered bytes still fit, and an
//! optional overwrite mode lets writers evict the oldest bytes instead of
//! failing when the ring is full.

use crate::error::{FramewireError, Result};

/// Byte ring with explicit head/tail bookkeeping.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    head: usize,
    tail: usize,
    size: usize,
    overwrite: bool,
}

impl RingBuffer {
    /// Create a ring with the given capacity. A zero capacity is clamped
    /// to one byte.
    ///
    /// `overwrite` controls full-buffer behavior: when set, writes that do
    /// not fit evict the oldest bytes; otherwise they fail with
    /// [`FramewireError::BufferFull`].
    pub fn new(capacity: usize, overwrite: bool) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            head: 0,
            tail: 0,
            size: 0,
            overwrite,
        }
    }

    /// Number of readable bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Free room in bytes.
    #[inline]
    pub fn room(&self) -> usize {
        self.buf.len() - self.size
    }

    /// Whether the ring holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the ring has no room left.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.size == self.buf.len()
    }

    /// Resize the ring to `capacity`, preserving contents.
    ///
    /// Shrinking below the buffered size is rejected with
    /// [`FramewireError::InvalidCapacity`] so queued bytes are never
    /// silently dropped; any capacity down to the current size is fine.
    /// A zero capacity is clamped to one byte.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.size {
            return Err(FramewireError::InvalidCapacity {
                requested: capacity,
                size: self.size,
            });
        }
        let capacity = capacity.max(1);
        if capacity == self.buf.len() {
            return Ok(());
        }

        let mut resized = vec![0; capacity];
        let preserved = self.size;
        self.read_into(&mut resized[..preserved], 0);
        self.buf = resized;
        self.head = 0;
        self.tail = preserved % capacity;
        self.size = preserved;
        Ok(())
    }

    /// Append bytes at the tail.
    ///
    /// With overwrite disabled, fails with [`FramewireError::BufferFull`]
    /// when `data` does not fit, leaving the ring untouched. With
    /// overwrite enabled, the oldest bytes are skipped to make room; data
    /// larger than the whole ring keeps only its trailing `capacity`
    /// bytes.
    pub fn put(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.room() {
            if !self.overwrite {
                return Err(FramewireError::BufferFull {
                    requested: data.len(),
                    room: self.room(),
                });
            }
            let needed = data.len().saturating_sub(self.room());
            let evict = needed.min(self.size);
            self.advance_head(evict);
        }

        let data = if data.len() > self.buf.len() {
            &data[data.len() - self.buf.len()..]
        } else {
            data
        };

        let first = (self.buf.len() - self.tail).min(data.len());
        self.buf[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        self.buf[..rest].copy_from_slice(&data[first..]);

        self.tail = (self.tail + data.len()) % self.buf.len();
        self.size += data.len();
        Ok(())
    }

    /// Copy the next `len` bytes from the head without consuming them.
    pub fn peek(&self, len: usize) -> Result<Vec<u8>> {
        if len > self.size {
            return Err(FramewireError::ShortBuffer {
                needed: len,
                available: self.size,
            });
        }
        let mut out = vec![0; len];
        self.read_into(&mut out, 0);
        Ok(out)
    }

    /// Remove and return the next `len` bytes from the head.
    pub fn get(&mut self, len: usize) -> Result<Vec<u8>> {
        let out = self.peek(len)?;
        self.advance_head(len);
        Ok(out)
    }

    /// Discard the next `len` bytes from the head.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.size {
            return Err(FramewireError::ShortBuffer {
                needed: len,
                available: self.size,
            });
        }
        self.advance_head(len);
        Ok(())
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.size = 0;
    }

    fn advance_head(&mut self, len: usize) {
        debug_assert!(len <= self.size);
        self.head = (self.head + len) % self.buf.len();
        self.size -= len;
    }

    fn read_into(&self, out: &mut [u8], offset: usize) {
        let start = (self.head + offset) % self.buf.len();
        let first = (self.buf.len() - start).min(out.len());
        out[..first].copy_from_slice(&self.buf[start..start + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.buf[..rest]);
    }
}
