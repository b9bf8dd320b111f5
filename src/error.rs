//! Error types for framewire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all framewire operations.
#[derive(Debug, Error)]
pub enum FramewireError {
    /// I/O error from the socket layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not enough bytes to parse a header or frame.
    #[error("short buffer: needed {needed} bytes, had {available}")]
    ShortBuffer { needed: usize, available: usize },

    /// Checksum or frame-length verification failed.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// Ring buffer overwrite is disabled and capacity would be exceeded.
    #[error("buffer full: {requested} bytes requested, {room} available")]
    BufferFull { requested: usize, room: usize },

    /// A frame declared a length the receive buffer can never hold.
    #[error("frame of {declared} bytes exceeds buffer capacity {capacity}")]
    FrameOversize { declared: usize, capacity: usize },

    /// Ring buffer capacity cannot shrink below its current content.
    #[error("capacity {requested} is below buffered size {size}")]
    InvalidCapacity { requested: usize, size: usize },

    /// Send attempted on a connection that is not connected.
    #[error("not connected")]
    NotConnected,

    /// Command name already registered under the same hash.
    #[error("duplicate command: {0}")]
    DuplicateCommand(String),

    /// Frame arrived for a command hash that was never registered.
    /// Non-fatal: the frame is dropped.
    #[error("unknown command hash: {0:02x?}")]
    UnknownCommand([u8; 6]),

    /// The per-connection send guard could not be acquired in time.
    #[error("send guard busy after {0:?}")]
    SendBusy(Duration),

    /// Envelope encrypt/decrypt failure (e.g. wrong key material).
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Frames must carry at least one body byte.
    #[error("frame body must not be empty")]
    EmptyBody,

    /// Command names must be non-empty.
    #[error("command name must not be empty")]
    EmptyCommandName,

    /// MsgPack serialization error.
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl FramewireError {
    /// Whether this error makes the connection's stream position
    /// untrustworthy for further framing.
    ///
    /// Fatal errors tear the connection down; non-fatal ones (an
    /// unregistered command, a payload the handler could not decode) are
    /// logged and the stream continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FramewireError::Io(_)
                | FramewireError::ShortBuffer { .. }
                | FramewireError::Integrity(_)
                | FramewireError::BufferFull { .. }
                | FramewireError::FrameOversize { .. }
                | FramewireError::Crypto(_)
        )
    }
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;
