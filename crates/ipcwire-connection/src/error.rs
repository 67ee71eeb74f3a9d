use ipcwire_codec::CodecError;
use ipcwire_transport::TransportError;

use crate::handler::HandlerError;

/// An error response returned by the remote request handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote error {code}: {message}")]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Encoding or decoding a payload failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer answered a call with an error response.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The connection is closing or closed.
    #[error("connection closed")]
    Closed,

    /// The connection has not been attached to a socket yet.
    #[error("connection not attached")]
    NotAttached,

    /// The connection is already running a session.
    #[error("connection already attached")]
    AlreadyAttached,

    /// The peer violated the message protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A notification handler failed.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// An I/O error occurred outside the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether this error reports the peer closing the socket.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_no_data())
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
