//! Client handle: spawn the service task and issue socket operations.
//!
//! [`Link::start`] wires a [`ComArea`], a [`SignalRegisters`] backend and
//! its wake source to a freshly spawned service task and returns a
//! cheaply cloneable [`Link`]. Each client task mints its own
//! [`LinkClient`] (carrying a unique [`ClientId`]) and drives sockets
//! through typed async operations.
//!
//! # Example
//!
//! ```ignore
//! use memwire::{Link, ReadOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), memwire::LinkError> {
//!     let (link, peer, _service) = Link::start_in_memory();
//!     // ... spawn something that drives `peer` ...
//!     let client = link.client();
//!     client.connect(1, "echo").await?;
//!     client.write(1, "hello").await?;
//!     if let ReadOutcome::Data(data) = client.read(1, 64).await? {
//!         println!("got {:?}", data);
//!     }
//!     client.eos(1).await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::protocol::ComArea;
use crate::request::{command, ClientId, IoReply, IoRequest, ReplyCode};
use crate::service::Service;
use crate::signal::SignalRegisters;
use crate::transport::{memory_link, Peer};

/// Handle to a running link service.
///
/// Cloneable; the service task runs until every clone (and every
/// [`LinkClient`]) is dropped. There is no orderly teardown: streams that
/// are live at that point are abandoned, not reset.
#[derive(Debug, Clone)]
pub struct Link {
    requests: mpsc::UnboundedSender<IoRequest>,
    next_client: Arc<AtomicU32>,
}

impl Link {
    /// Spawn the service task over the given transport.
    ///
    /// `registers` is the peer-signal register file; `wake` is the
    /// notifier its implementation posts when an armed edge fires.
    pub fn start<R: SignalRegisters>(
        com_area: Arc<ComArea>,
        registers: R,
        wake: Arc<Notify>,
    ) -> (Link, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Service::new(com_area, registers, wake, rx);
        let task = tokio::spawn(service.run());
        (
            Link {
                requests: tx,
                next_client: Arc::new(AtomicU32::new(1)),
            },
            task,
        )
    }

    /// Spawn the service over the in-process transport.
    ///
    /// Returns the link, the [`Peer`] endpoint for driving the remote
    /// side, and the service task handle.
    pub fn start_in_memory() -> (Link, Peer, JoinHandle<()>) {
        let (endpoint, peer) = memory_link();
        let (link, task) = Self::start(endpoint.com_area, endpoint.registers, endpoint.wake);
        (link, peer, task)
    }

    /// Mint a client with a fresh [`ClientId`].
    ///
    /// Socket ids are scoped per client, so two clients may both use
    /// socket id 1 without clashing.
    pub fn client(&self) -> LinkClient {
        LinkClient {
            owner: ClientId(self.next_client.fetch_add(1, Ordering::Relaxed)),
            requests: self.requests.clone(),
        }
    }
}

/// Outcome of a successful [`LinkClient::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One datagram, boundaries preserved.
    Data(Bytes),
    /// The peer half-closed; no further data will arrive.
    Eos,
}

/// Per-client handle issuing socket operations.
///
/// Clones share the same [`ClientId`] and therefore the same socket id
/// space. Dropping a pending operation's future does not withdraw the
/// request; there is no cancellation. Use [`reset`](Self::reset) to
/// abort a stream.
#[derive(Debug, Clone)]
pub struct LinkClient {
    owner: ClientId,
    requests: mpsc::UnboundedSender<IoRequest>,
}

impl LinkClient {
    /// This client's identity.
    pub fn id(&self) -> ClientId {
        self.owner
    }

    /// Open `socket_id` to the named remote service.
    pub async fn connect(&self, socket_id: u8, service: impl Into<Bytes>) -> Result<()> {
        let reply = self
            .submit(command::CONNECT, socket_id, service.into(), 0)
            .await?;
        match reply.code {
            ReplyCode::ConnectOk => Ok(()),
            ReplyCode::ConnectReset => Err(LinkError::Reset),
            ReplyCode::ConnectUnknownService => Err(LinkError::UnknownService),
            ReplyCode::ConnectSocketInUse => Err(LinkError::SocketInUse),
            code => Err(LinkError::Unexpected(code)),
        }
    }

    /// Receive one datagram of at most `capacity` bytes.
    ///
    /// A datagram larger than `capacity` resets the stream.
    pub async fn read(&self, socket_id: u8, capacity: usize) -> Result<ReadOutcome> {
        let reply = self
            .submit(command::READ, socket_id, Bytes::new(), capacity)
            .await?;
        match reply.code {
            ReplyCode::ReadOk => Ok(ReadOutcome::Data(reply.data)),
            ReplyCode::ReadEos => Ok(ReadOutcome::Eos),
            ReplyCode::ReadReset => Err(LinkError::Reset),
            code => Err(LinkError::Unexpected(code)),
        }
    }

    /// Send one datagram (at most 252 bytes).
    ///
    /// Completes once the frame is in the outbound ring, which may wait
    /// for the peer to free room.
    pub async fn write(&self, socket_id: u8, payload: impl Into<Bytes>) -> Result<()> {
        let reply = self
            .submit(command::WRITE, socket_id, payload.into(), 0)
            .await?;
        match reply.code {
            ReplyCode::WriteOk => Ok(()),
            ReplyCode::WriteReset => Err(LinkError::Reset),
            code => Err(LinkError::Unexpected(code)),
        }
    }

    /// Half-close the outgoing direction.
    pub async fn eos(&self, socket_id: u8) -> Result<()> {
        let reply = self.submit(command::EOS, socket_id, Bytes::new(), 0).await?;
        match reply.code {
            ReplyCode::EosOk => Ok(()),
            ReplyCode::EosReset => Err(LinkError::Reset),
            code => Err(LinkError::Unexpected(code)),
        }
    }

    /// Abort the stream in both directions. Idempotent.
    pub async fn reset(&self, socket_id: u8) -> Result<()> {
        let reply = self
            .submit(command::RESET, socket_id, Bytes::new(), 0)
            .await?;
        match reply.code {
            ReplyCode::ResetOk => Ok(()),
            code => Err(LinkError::Unexpected(code)),
        }
    }

    /// Submit a raw request and await its completion.
    pub async fn submit(
        &self,
        command: u8,
        socket_id: u8,
        data: Bytes,
        capacity: usize,
    ) -> Result<IoReply> {
        let (req, rx) = IoRequest::new(self.owner, command, socket_id, data, capacity);
        self.requests.send(req).map_err(|_| LinkError::LinkDown)?;
        rx.await.map_err(|_| LinkError::LinkDown)
    }
}
