use std::path::PathBuf;

/// Errors that can occur in IPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A zero-length header record was read. The peer most likely closed the socket.
    #[error("no data (peer closed the connection)")]
    NoData,

    /// The socket handed to the transport has the wrong family or type.
    #[error("wrong socket: {0}")]
    WrongSocket(String),

    /// A header or body record had an unexpected length.
    #[error("read error: {0}")]
    Read(String),

    /// A header or body record was not written completely.
    #[error("write error: {0}")]
    Write(String),

    /// Ancillary data of an unexpected kind or a descriptor count mismatch.
    #[error("wrong data: {0}")]
    WrongData(String),

    /// A message body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// Whether this error reports a clean close by the peer.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by [`Fd`](crate::Fd) ownership operations.
#[derive(Debug, thiserror::Error)]
pub enum FdError {
    /// The descriptor was already taken or closed.
    #[error("file descriptor {0} is no longer owned")]
    NotOwned(i32),

    /// A negative descriptor number was supplied.
    #[error("invalid file descriptor: {0}")]
    Invalid(i32),

    /// Duplicating or closing the descriptor failed.
    #[error("file descriptor I/O error: {0}")]
    Io(#[from] std::io::Error),
}
