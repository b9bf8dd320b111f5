//! Frame reassembly from an arbitrarily chunked byte stream.
//!
//! TCP delivers bytes, not frames: one frame may arrive split across many
//! reads, and one read may coalesce many frames. The reassembler buffers
//! incoming bytes in a [`RingBuffer`] and cuts them at frame boundaries
//! using the leading length field.

use super::ring_buffer::RingBuffer;
use super::wire_format::{self, Frame, LENGTH_SIZE, MIN_FRAME_SIZE};
use crate::error::{FramewireError, Result};

/// Default reassembly buffer capacity (64 KiB).
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Accumulates stream bytes and yields complete, checksum-verified frames.
///
/// A reassembler is owned by a single connection's read loop. Any error
/// it returns means the stream is desynchronized and the connection must
/// be torn down; there is no way to re-find a frame boundary in a
/// corrupted stream.
#[derive(Debug)]
pub struct Reassembler {
    ring: RingBuffer,
}

impl Reassembler {
    /// Create a reassembler with the given buffer capacity.
    ///
    /// Overwrite stays off: losing buffered bytes would desync framing.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, false)
    }

    /// Create a reassembler with an explicit overwrite policy.
    pub fn with_policy(capacity: usize, allow_overwrite: bool) -> Self {
        Self {
            ring: RingBuffer::new(capacity, allow_overwrite),
        }
    }

    /// Bytes currently buffered awaiting a complete frame.
    pub fn buffered(&self) -> usize {
        self.ring.size()
    }

    /// Drop any partially buffered frame.
    pub fn reset(&mut self) {
        self.ring.clear();
    }

    /// Feed a chunk of stream bytes and collect every frame it completes.
    ///
    /// Returns zero or more frames. Each returned frame has passed the
    /// checksum and length check.
    ///
    /// # Errors
    ///
    /// All errors are fatal to the stream:
    /// - [`FramewireError::BufferFull`] when the chunk overflows the
    ///   reassembly buffer,
    /// - [`FramewireError::Integrity`] when a declared length is below
    ///   the minimum frame size or a completed frame fails verification,
    /// - [`FramewireError::FrameOversize`] when a declared length exceeds
    ///   the buffer capacity and so could never complete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.ring.put(chunk)?;

        let mut frames = Vec::new();
        while self.ring.size() > LENGTH_SIZE {
            let prefix = self.ring.peek(LENGTH_SIZE)?;
            let total = wire_format::message_length(&prefix)? as usize;

            if total < MIN_FRAME_SIZE {
                return Err(FramewireError::Integrity(format!(
                    "declared frame length {total} below minimum {MIN_FRAME_SIZE}"
                )));
            }
            if total > self.ring.capacity() {
                return Err(FramewireError::FrameOversize {
                    declared: total,
                    capacity: self.ring.capacity(),
                });
            }
            if self.ring.size() < total {
                break;
            }

            let raw = self.ring.get(total)?;
            let frame = wire_format::decode(&raw)?;
            if !wire_format::is_valid(&frame) {
                return Err(FramewireError::Integrity(
                    "frame failed checksum or length verification".into(),
                ));
            }
            frames.push(frame);
        }
        Ok(frames)
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
