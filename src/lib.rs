//! # memwire
//!
//! Bidirectional, stream-multiplexed packet transport over a
//! shared-memory mailbox.
//!
//! Two asymmetric peers share a [`ComArea`]: two 256-byte rings with
//! free-running 8-bit indices, one per direction. The local side runs a
//! single cooperative service task that multiplexes client socket
//! operations (CONNECT, READ, WRITE, EOS, RESET) onto the rings as
//! `{length, type, stream_id}` frames, while a nibble register file
//! carries edge wake-ups between the sides.
//!
//! ## Architecture
//!
//! - **Wire layer** ([`protocol`]): 3-byte frame headers, frozen packet
//!   type codes, lock-free single-writer rings.
//! - **Service task** (internal): the protocol state machine. Socket
//!   lifecycle, half-close bookkeeping, FIFO send queue with head-of-line
//!   blocking, and the gated enable/event arming protocol.
//! - **Client surface** ([`handle`]): [`Link`] spawns the service;
//!   [`LinkClient`] issues typed async operations.
//! - **Transports** ([`transport`]): an in-process ComArea + register
//!   file pair for tests and demos; hardware backends implement
//!   [`signal::SignalRegisters`].
//!
//! Delivery is in-order and at-most-once per stream; there is no
//! retransmission (the medium is lossless), no fragmentation above
//! 252-byte datagrams, and no congestion control beyond ring capacity.
//!
//! ## Example
//!
//! ```ignore
//! use memwire::{Link, ReadOutcome};
//!
//! let (link, peer, _service) = Link::start_in_memory();
//! let client = link.client();
//! client.connect(1, "echo").await?;
//! client.write(1, "hello").await?;
//! let echoed = client.read(1, 64).await?;
//! ```

pub mod error;
pub mod handle;
pub mod protocol;
pub mod request;
pub mod signal;
pub mod transport;

mod service;
mod socket;

pub use error::LinkError;
pub use handle::{Link, LinkClient, ReadOutcome};
pub use protocol::{packet_type, ComArea, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, RING_CAPACITY};
pub use request::{ClientId, IoReply, IoRequest, ReplyCode};
