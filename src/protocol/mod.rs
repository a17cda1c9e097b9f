//! Protocol module - wire format, framing, and the shared rings.
//!
//! This module implements the shared-memory wire layer:
//! - 3-byte frame header encoding/decoding and packet type codes
//! - the two 256-byte rings with free-running 8-bit indices

mod ring;
mod wire_format;

pub use ring::{ComArea, Ring};
pub use wire_format::{
    packet_type, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, RING_CAPACITY, RING_SIZE,
};
