//! The ComArea: two fixed-size rings shared with the peer.
//!
//! Each [`Ring`] is 256 bytes with free-running `u8` head/tail counters:
//! `used = (tail - head) & 0xFF`, empty iff `head == tail`, full iff
//! `used == 255`. The head is advanced only by the reading side and the
//! tail only by the writing side, so the rings are lock-free as long as
//! each side serializes its own updates.
//!
//! Cells and indices are atomics so both sides of the link can share one
//! [`ComArea`] behind an `Arc`. A frame becomes visible to the reader
//! only at the release store of `tail`; the writer never publishes a
//! partial frame.

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, RING_CAPACITY, RING_SIZE};

/// One direction of the shared mailbox.
pub struct Ring {
    buf: [AtomicU8; RING_SIZE],
    head: AtomicU8,
    tail: AtomicU8,
}

impl Ring {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            buf: std::array::from_fn(|_| AtomicU8::new(0)),
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
        }
    }

    /// Current head index (free-running).
    #[inline]
    pub fn head(&self) -> u8 {
        self.head.load(Ordering::Acquire)
    }

    /// Current tail index (free-running).
    #[inline]
    pub fn tail(&self) -> u8 {
        self.tail.load(Ordering::Acquire)
    }

    /// Number of used bytes.
    #[inline]
    pub fn used(&self) -> usize {
        self.tail().wrapping_sub(self.head()) as usize
    }

    /// Check whether the ring is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head() == self.tail()
    }

    /// Check whether a frame with `payload_len` payload bytes fits.
    #[inline]
    pub fn has_room(&self, payload_len: usize) -> bool {
        self.used() + HEADER_SIZE + payload_len <= RING_CAPACITY
    }

    /// Append one frame. Writer side only.
    ///
    /// The caller must have checked [`has_room`](Self::has_room); append
    /// itself never blocks and never partially writes. Payload bytes wrap
    /// freely across the 256-byte boundary.
    pub fn append(&self, packet_type: u8, stream_id: u8, payload: &[u8]) {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
        debug_assert!(self.has_room(payload.len()));

        let mut index = self.tail.load(Ordering::Relaxed);
        self.store(index, payload.len() as u8);
        index = index.wrapping_add(1);
        self.store(index, packet_type);
        index = index.wrapping_add(1);
        self.store(index, stream_id);
        index = index.wrapping_add(1);
        for &byte in payload {
            self.store(index, byte);
            index = index.wrapping_add(1);
        }
        // Publication point: the frame is visible to the reader from here.
        self.tail.store(index, Ordering::Release);
    }

    /// Peek the header of the frame at the head. Reader side only.
    ///
    /// Returns `None` if the ring is empty. The writer publishes whole
    /// frames, so a non-empty ring always holds a complete one.
    pub fn peek_header(&self) -> Option<FrameHeader> {
        if self.is_empty() {
            return None;
        }
        let head = self.head.load(Ordering::Relaxed);
        Some(FrameHeader {
            length: self.load(head),
            packet_type: self.load(head.wrapping_add(1)),
            stream_id: self.load(head.wrapping_add(2)),
        })
    }

    /// Copy the payload of the frame at the head. Reader side only.
    pub fn copy_payload(&self, length: u8) -> Bytes {
        let head = self.head.load(Ordering::Relaxed);
        let start = head.wrapping_add(HEADER_SIZE as u8);
        let mut out = BytesMut::with_capacity(length as usize);
        for i in 0..length {
            out.put_u8(self.load(start.wrapping_add(i)));
        }
        out.freeze()
    }

    /// Advance the head past `n` consumed bytes. Reader side only.
    pub fn consume(&self, n: usize) {
        debug_assert!(n <= self.used());
        let head = self.head.load(Ordering::Relaxed);
        self.head
            .store(head.wrapping_add(n as u8), Ordering::Release);
    }

    #[inline]
    fn load(&self, index: u8) -> u8 {
        self.buf[index as usize].load(Ordering::Relaxed)
    }

    #[inline]
    fn store(&self, index: u8, value: u8) {
        self.buf[index as usize].store(value, Ordering::Relaxed);
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("head", &self.head())
            .field("tail", &self.tail())
            .field("used", &self.used())
            .finish()
    }
}

/// The shared mailbox: one ring per direction.
///
/// `a2r` carries local-to-remote frames, `r2a` remote-to-local. The local
/// service writes `a2r` and reads `r2a`; the peer does the opposite.
#[derive(Debug, Default)]
pub struct ComArea {
    /// Local → remote ring.
    pub a2r: Ring,
    /// Remote → local ring.
    pub r2a: Ring,
}

impl ComArea {
    /// Create an empty ComArea.
    pub fn new() -> Self {
        Self::default()
    }
}
