//! Client request ABI.
//!
//! Clients talk to the service task through [`IoRequest`] messages posted
//! on the link's inbox channel. Each request carries a command code, a
//! client-chosen socket id, a payload or capacity, and a oneshot reply
//! slot that the service fills exactly once with an [`IoReply`].

use bytes::Bytes;
use tokio::sync::oneshot;

/// Command codes carried by [`IoRequest`].
pub mod command {
    /// Open a stream to a named service (payload = service name).
    pub const CONNECT: u8 = 1;
    /// Receive one datagram (capacity = client buffer size).
    pub const READ: u8 = 2;
    /// Send one datagram (payload = data).
    pub const WRITE: u8 = 3;
    /// Half-close the outgoing direction.
    pub const EOS: u8 = 4;
    /// Abort the stream in both directions.
    pub const RESET: u8 = 5;
}

/// Identifies the client that owns a socket.
///
/// Socket ids are only unique per client, so every socket is addressed by
/// the `(ClientId, socket_id)` pair. Minted by [`Link::client`].
///
/// [`Link::client`]: crate::handle::Link::client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// Completion codes delivered in [`IoReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    ConnectOk,
    ConnectReset,
    ConnectUnknownService,
    ConnectSocketInUse,
    ReadOk,
    ReadReset,
    ReadEos,
    WriteOk,
    WriteReset,
    EosOk,
    EosReset,
    ResetOk,
    /// The command code was not recognized.
    NoCmd,
}

/// Completion of an [`IoRequest`].
#[derive(Debug)]
pub struct IoReply {
    /// Outcome of the operation.
    pub code: ReplyCode,
    /// Delivered payload; non-empty only for `ReadOk`.
    pub data: Bytes,
}

/// One client request message.
///
/// The reply slot is private and consumed by [`complete`](Self::complete),
/// so a request can never be answered twice.
#[derive(Debug)]
pub struct IoRequest {
    /// Client that issued the request.
    pub owner: ClientId,
    /// Command code (see [`command`]).
    pub command: u8,
    /// Client-chosen local socket id.
    pub socket_id: u8,
    /// Payload: service name for CONNECT, data for WRITE, empty otherwise.
    pub data: Bytes,
    /// Client buffer capacity; meaningful for READ only.
    pub capacity: usize,
    reply: oneshot::Sender<IoReply>,
}

impl IoRequest {
    /// Create a request and the receiver its reply will arrive on.
    pub fn new(
        owner: ClientId,
        command: u8,
        socket_id: u8,
        data: Bytes,
        capacity: usize,
    ) -> (Self, oneshot::Receiver<IoReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                owner,
                command,
                socket_id,
                data,
                capacity,
                reply: tx,
            },
            rx,
        )
    }

    /// Complete the request, consuming it.
    ///
    /// The send is best-effort: a client that dropped its receiver simply
    /// misses the reply.
    pub fn complete(self, code: ReplyCode, data: Bytes) {
        let _ = self.reply.send(IoReply { code, data });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_delivers_reply() {
        let (req, mut rx) = IoRequest::new(ClientId(1), command::READ, 5, Bytes::new(), 16);
        assert_eq!(req.owner, ClientId(1));
        assert_eq!(req.socket_id, 5);

        req.complete(ReplyCode::ReadOk, Bytes::from_static(b"abc"));

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.code, ReplyCode::ReadOk);
        assert_eq!(&reply.data[..], b"abc");
    }

    #[test]
    fn test_complete_with_dropped_receiver_is_silent() {
        let (req, rx) = IoRequest::new(ClientId(1), command::WRITE, 5, Bytes::new(), 0);
        drop(rx);
        req.complete(ReplyCode::WriteOk, Bytes::new());
    }
}
