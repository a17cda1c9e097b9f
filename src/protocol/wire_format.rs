//! Wire format encoding and decoding.
//!
//! Implements the 3-byte frame header:
//! ```text
//! ┌────────┬──────┬───────────┐
//! │ Length │ Type │ Stream ID │
//! │ 1 byte │1 byte│ 1 byte    │
//! └────────┴──────┴───────────┘
//! ```
//! followed by `length` payload bytes. Frames live inside the two
//! 256-byte rings of the [`ComArea`](super::ComArea); all sizes fit in a
//! `u8` by construction.

/// Header size in bytes (fixed, exactly 3).
pub const HEADER_SIZE: usize = 3;

/// Ring size in bytes. Indices are free-running `u8` counters, so the
/// ring is addressed modulo this value.
pub const RING_SIZE: usize = 256;

/// Usable ring capacity. One byte is reserved so a full ring can be
/// distinguished from an empty one (`used == 255` vs `head == tail`).
pub const RING_CAPACITY: usize = 255;

/// Largest payload a single frame can carry (`RING_CAPACITY - HEADER_SIZE`).
pub const MAX_PAYLOAD_SIZE: usize = 252;

/// Packet type codes.
///
/// The numeric assignments are frozen: both peers must agree on them and
/// they are visible on the wire.
pub mod packet_type {
    /// Open a stream to a named service; payload is the service name.
    pub const CONNECT: u8 = 4;
    /// Answer to CONNECT; 1-byte payload, 0 = ok, nonzero = unknown service.
    pub const CONNECT_RESPONSE: u8 = 5;
    /// One datagram of stream data.
    pub const DATA: u8 = 6;
    /// Half-close: the sender will emit no further DATA on this stream.
    pub const EOS: u8 = 7;
    /// Immediate bidirectional abort of a stream.
    pub const RESET: u8 = 8;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes (0..=252).
    pub length: u8,
    /// Packet type (see [`packet_type`]).
    pub packet_type: u8,
    /// Stream the frame belongs to.
    pub stream_id: u8,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(length: u8, packet_type: u8, stream_id: u8) -> Self {
        Self {
            length,
            packet_type,
            stream_id,
        }
    }

    /// Encode the header to its wire bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        [self.length, self.packet_type, self.stream_id]
    }

    /// Decode a header from wire bytes.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: buf[0],
            packet_type: buf[1],
            stream_id: buf[2],
        })
    }

    /// Total bytes the frame occupies in a ring (header + payload).
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}
