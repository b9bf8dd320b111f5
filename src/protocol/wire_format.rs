//! Wire format encoding and decoding.
//!
//! Implements the 16-byte header format:
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────┐
//! │ Total length │ Command hash │ Checksum     │ Body     │
//! │ 4 bytes u32  │ 6 bytes      │ 6 bytes      │ variable │
//! └──────────────┴──────────────┴──────────────┴──────────┘
//! ```
//!
//! `total_len` always equals `16 + body.len()`; the body is never empty.
//!
//! # Byte order
//!
//! The protocol transmits the *entire* frame in the reverse byte order of
//! the producing host when that host is little-endian. A frame is
//! assembled as `body ‖ checksum ‖ command_hash ‖ total_len` (native
//! endian) and the whole buffer is then reversed, which places the length
//! field at offset 0 on the wire with every field, body included,
//! byte-reversed. Decoding mirrors the same whole-buffer reversal, so the
//! two directions are symmetric as long as both ends share the
//! convention. Only the length field is endian-sensitive on its own, but
//! the reversal is applied to header and body together for wire
//! compatibility.

use bytes::Bytes;

use super::digest::{self, DIGEST_LEN};
use crate::error::{FramewireError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Size of the leading total-length field.
pub const LENGTH_SIZE: usize = 4;

/// Smallest frame the decoder accepts: a header plus one body byte.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length in bytes (header + body).
    pub total_len: u32,
    /// Truncated digest of the command name; routes the frame to a handler.
    pub command_hash: [u8; DIGEST_LEN],
    /// Truncated digest of the body bytes as they appear on the wire.
    pub checksum: [u8; DIGEST_LEN],
}

/// A complete protocol frame.
///
/// Frames are ephemeral: one is produced per send or receive event and
/// owned solely by the call that produced it. The body is shared
/// zero-copy via `bytes::Bytes`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Body bytes in assembly order (payload, possibly ciphertext).
    pub body: Bytes,
}

impl Frame {
    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Get the command hash that routes this frame.
    #[inline]
    pub fn command_hash(&self) -> &[u8; DIGEST_LEN] {
        &self.header.command_hash
    }
}

/// Encode a body and command name into a complete wire frame.
///
/// Computes the command hash and body checksum, prepends the 16-byte
/// header and applies the whole-buffer reversal described in the module
/// docs.
///
/// # Errors
///
/// Fails with [`FramewireError::EmptyBody`] for an empty body and
/// [`FramewireError::EmptyCommandName`] for an empty command name.
pub fn encode(body: &[u8], command: &str) -> Result<Vec<u8>> {
    if body.is_empty() {
        return Err(FramewireError::EmptyBody);
    }
    if command.is_empty() {
        return Err(FramewireError::EmptyCommandName);
    }

    let total = (HEADER_SIZE + body.len()) as u32;
    let mut buf = Vec::with_capacity(total as usize);
    buf.extend_from_slice(body);
    buf.extend_from_slice(&digest::checksum(body));
    buf.extend_from_slice(&digest::command_hash(command));
    buf.extend_from_slice(&total.to_ne_bytes());

    if cfg!(target_endian = "little") {
        buf.reverse();
    }

    Ok(buf)
}

/// Decode a complete wire frame.
///
/// Undoes the whole-buffer reversal, then splits header fields from the
/// body. The input must be exactly one frame; the reassembler is
/// responsible for cutting the stream at frame boundaries.
///
/// # Errors
///
/// Fails with [`FramewireError::ShortBuffer`] when fewer than
/// [`MIN_FRAME_SIZE`] bytes are supplied.
pub fn decode(raw: &[u8]) -> Result<Frame> {
    if raw.len() < MIN_FRAME_SIZE {
        return Err(FramewireError::ShortBuffer {
            needed: MIN_FRAME_SIZE,
            available: raw.len(),
        });
    }

    let mut data = raw.to_vec();
    if cfg!(target_endian = "little") {
        data.reverse();
    }

    // Normalized assembly order: body ‖ checksum ‖ command_hash ‖ total_len.
    let body_len = data.len() - HEADER_SIZE;

    let mut checksum = [0u8; DIGEST_LEN];
    checksum.copy_from_slice(&data[body_len..body_len + DIGEST_LEN]);

    let mut command_hash = [0u8; DIGEST_LEN];
    command_hash.copy_from_slice(&data[body_len + DIGEST_LEN..body_len + 2 * DIGEST_LEN]);

    let mut len_bytes = [0u8; LENGTH_SIZE];
    len_bytes.copy_from_slice(&data[body_len + 2 * DIGEST_LEN..]);
    let total_len = u32::from_ne_bytes(len_bytes);

    data.truncate(body_len);

    Ok(Frame {
        header: FrameHeader {
            total_len,
            command_hash,
            checksum,
        },
        body: Bytes::from(data),
    })
}

/// Verify a decoded frame's integrity.
///
/// Recomputes the body checksum and checks the declared total length
/// against the actual body size. Command-hash corruption is not
/// detectable here (the receiver does not know the name) and surfaces as
/// an unknown command at dispatch instead.
pub fn is_valid(frame: &Frame) -> bool {
    frame.header.total_len as usize == HEADER_SIZE + frame.body.len()
        && digest::checksum(&frame.body) == frame.header.checksum
}

/// Read the declared total frame length from the first wire bytes.
///
/// Used by the reassembler to decide whether a complete frame has
/// arrived. Needs only the leading [`LENGTH_SIZE`] bytes.
pub fn message_length(raw: &[u8]) -> Result<u32> {
    if raw.len() < LENGTH_SIZE {
        return Err(FramewireError::ShortBuffer {
            needed: LENGTH_SIZE,
            available: raw.len(),
        });
    }

    let mut len_bytes = [raw[0], raw[1], raw[2], raw[3]];
    if cfg!(target_endian = "little") {
        len_bytes.reverse();
    }
    Ok(u32::from_ne_bytes(len_bytes))
}
