//! Error types for memwire.

use thiserror::Error;

use crate::request::ReplyCode;

/// Errors surfaced by the typed client operations on [`LinkClient`].
///
/// [`LinkClient`]: crate::handle::LinkClient
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The service task has stopped (all `Link` handles were dropped, or
    /// the task ended before replying).
    #[error("link service task has stopped")]
    LinkDown,

    /// The stream was reset: by the peer, by a protocol error, or because
    /// the request itself was invalid for the socket's state.
    #[error("stream was reset")]
    Reset,

    /// The peer has no service registered under the requested name.
    #[error("no remote service with the requested name")]
    UnknownService,

    /// The `(client, socket_id)` pair already names a live socket.
    #[error("socket id is already in use")]
    SocketInUse,

    /// The service replied with a code outside the command's family.
    #[error("unexpected completion code: {0:?}")]
    Unexpected(ReplyCode),
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
