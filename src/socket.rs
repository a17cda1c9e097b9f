//! Socket state and the dual-indexed socket table.
//!
//! A socket is one live stream: it pairs a wire-visible `stream_id` with
//! the `(ClientId, socket_id)` key the owning client uses. The table
//! indexes both ways: inbound frames resolve by stream id, client
//! requests by owner pair.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use crate::request::{ClientId, IoRequest};

/// Socket state flag bits.
pub mod flags {
    /// No further operations are accepted; the socket may linger only to
    /// emit a trailing RESET.
    pub const CLOSED: u8 = 0x01;
    /// A RESET frame is owed to the peer before the socket can be deleted.
    pub const SHOULD_SEND_RESET: u8 = 0x02;
    /// The peer half-closed its direction.
    pub const RCVD_EOS_FROM_PEER: u8 = 0x04;
    /// Our EOS frame is in the outbound ring; no DATA or EOS may follow.
    pub const SENT_EOS_TO_PEER: u8 = 0x08;
    /// The client has been told the stream ended (READ_EOS reply).
    pub const SENT_EOS_TO_CLIENT: u8 = 0x10;
    /// The client half-closed; further WRITE/EOS requests are rejected.
    pub const RCVD_EOS_FROM_CLIENT: u8 = 0x20;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// One live stream.
#[derive(Debug)]
pub struct Socket {
    /// Wire-visible stream id (odd: locally initiated).
    pub stream_id: u8,
    /// Owning client.
    pub owner: ClientId,
    /// Client-chosen local id.
    pub local_id: u8,
    /// State bits (see [`flags`]).
    pub flags: u8,
    /// Outstanding CONNECT, answered by the peer's CONNECT_RESPONSE.
    pub pending_connect: Option<IoRequest>,
    /// Outstanding READ, answered by inbound DATA/EOS.
    pub pending_read: Option<IoRequest>,
    /// Outstanding WRITE or EOS waiting for outbound ring room.
    pub pending_write: Option<IoRequest>,
    /// Inbound payloads not yet consumed by a client READ.
    pub rq: VecDeque<Bytes>,
    /// Payload bytes the next outbound frame needs room for; valid while
    /// the socket is in the send queue.
    pub required_len: usize,
    /// Whether the socket currently sits in the send queue.
    pub in_send_queue: bool,
}

impl Socket {
    fn new(stream_id: u8, owner: ClientId, local_id: u8) -> Self {
        Self {
            stream_id,
            owner,
            local_id,
            flags: 0,
            pending_connect: None,
            pending_read: None,
            pending_write: None,
            rq: VecDeque::new(),
            required_len: 0,
            in_send_queue: false,
        }
    }
}

/// All live sockets, indexed by stream id and by owner pair.
#[derive(Debug, Default)]
pub struct SocketTable {
    by_stream: HashMap<u8, Socket>,
    by_client: HashMap<(ClientId, u8), u8>,
    next_stream_id: u8,
}

/// Locally initiated stream ids are odd; the peer allocates even ones.
const FIRST_STREAM_ID: u8 = 1;
const STREAM_ID_STRIDE: u8 = 2;
const LOCAL_STREAM_ID_SPACE: usize = 128;

impl SocketTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            by_stream: HashMap::new(),
            by_client: HashMap::new(),
            next_stream_id: FIRST_STREAM_ID,
        }
    }

    /// Create a socket for `(owner, local_id)` and return its stream id.
    ///
    /// Returns `None` when every local stream id is live. The caller must
    /// have checked that the owner pair is unused.
    pub fn create(&mut self, owner: ClientId, local_id: u8) -> Option<u8> {
        let stream_id = self.alloc_stream_id()?;
        self.by_stream
            .insert(stream_id, Socket::new(stream_id, owner, local_id));
        self.by_client.insert((owner, local_id), stream_id);
        Some(stream_id)
    }

    /// Look up the stream id for a client's socket.
    pub fn find(&self, owner: ClientId, local_id: u8) -> Option<u8> {
        self.by_client.get(&(owner, local_id)).copied()
    }

    /// Borrow a socket by stream id.
    pub fn get(&self, stream_id: u8) -> Option<&Socket> {
        self.by_stream.get(&stream_id)
    }

    /// Mutably borrow a socket by stream id.
    pub fn get_mut(&mut self, stream_id: u8) -> Option<&mut Socket> {
        self.by_stream.get_mut(&stream_id)
    }

    /// Delete a socket, severing both indices and freeing queued data.
    pub fn delete(&mut self, stream_id: u8) -> Option<Socket> {
        let socket = self.by_stream.remove(&stream_id)?;
        self.by_client.remove(&(socket.owner, socket.local_id));
        Some(socket)
    }

    // A stream id must not be reused while either side may still refer to
    // it, so the wrapping counter skips ids that are still in the table
    // (deletion already waits for any owed RESET frame to be rung).
    fn alloc_stream_id(&mut self) -> Option<u8> {
        for _ in 0..LOCAL_STREAM_ID_SPACE {
            let id = self.next_stream_id;
            self.next_stream_id = self.next_stream_id.wrapping_add(STREAM_ID_STRIDE);
            if !self.by_stream.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }
}
