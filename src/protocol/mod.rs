//! Binary wire protocol: framing, digests, reassembly, encryption.

pub mod digest;
pub mod envelope;
pub mod reassembler;
pub mod ring_buffer;
pub mod wire_format;

pub use envelope::{Envelope, EnvelopeKeys};
pub use reassembler::Reassembler;
pub use ring_buffer::RingBuffer;
pub use wire_format::{Frame, FrameHeader, HEADER_SIZE, LENGTH_SIZE, MIN_FRAME_SIZE};
