//! Async transport over tokio's reactor.
//!
//! Both directions run on the same non-blocking socket: reads and writes take
//! `&self`, so one task can read while another writes.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::error::{Result, TransportError};
use crate::listener::SeqPacketListener;
use crate::message::{Message, TransportConfig};
use crate::packet;
use crate::socket::SeqPacketSocket;

/// Async message transport. Same framing as [`PacketTransport`](crate::PacketTransport).
pub struct AsyncPacketTransport {
    inner: AsyncFd<SeqPacketSocket>,
    config: TransportConfig,
}

impl AsyncPacketTransport {
    /// Register a socket with the reactor using default limits.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(socket: SeqPacketSocket) -> Result<Self> {
        Self::with_config(socket, TransportConfig::default())
    }

    /// Register a socket with the reactor using explicit limits.
    pub fn with_config(socket: SeqPacketSocket, config: TransportConfig) -> Result<Self> {
        socket.set_nonblocking(true)?;
        let inner = AsyncFd::with_interest(socket, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self { inner, config })
    }

    /// Connect to `path` and register the socket.
    pub async fn connect(path: impl AsRef<Path>, config: TransportConfig) -> Result<Self> {
        let socket = connect_socket(path.as_ref().to_path_buf()).await?;
        Self::with_config(socket, config)
    }

    /// Read the next message.
    ///
    /// Not cancel safe: dropping the future after the header record was
    /// consumed leaves the body record queued and desynchronizes the stream.
    pub async fn read(&self) -> Result<Message> {
        let header = self
            .readable(|fd| packet::read_header(fd, &self.config))
            .await?;
        let (data, fds) = self.readable(|fd| packet::read_body(fd, &header)).await?;
        Ok(packet::into_message(header, data, fds))
    }

    /// Write one message. Its descriptors are closed afterwards.
    pub async fn write(&self, msg: Message) -> Result<()> {
        let header = packet::prepare_write(&msg, &self.config)?;
        self.writable(|fd| packet::write_header(fd, &header)).await?;
        self.writable(|fd| packet::write_body(fd, &msg)).await
    }

    /// Shut down both directions so the peer and any pending read observe end of stream.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.get_ref().shutdown()
    }

    /// Borrow the underlying socket.
    pub fn socket(&self) -> &SeqPacketSocket {
        self.inner.get_ref()
    }

    /// Current limits.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn readable<T>(&self, mut op: impl FnMut(BorrowedFd<'_>) -> Result<T>) -> Result<T> {
        loop {
            let mut guard = self.inner.readable().await?;
            match op(guard.get_inner().as_fd()) {
                Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    guard.clear_ready();
                }
                other => return other,
            }
        }
    }

    async fn writable<T>(&self, mut op: impl FnMut(BorrowedFd<'_>) -> Result<T>) -> Result<T> {
        loop {
            let mut guard = self.inner.writable().await?;
            match op(guard.get_inner().as_fd()) {
                Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    guard.clear_ready();
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for AsyncPacketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPacketTransport")
            .field("socket", self.inner.get_ref())
            .finish()
    }
}

/// Connect on the blocking pool; a full listen backlog would otherwise stall the reactor.
pub async fn connect_socket(path: PathBuf) -> Result<SeqPacketSocket> {
    tokio::task::spawn_blocking(move || SeqPacketSocket::connect(&path))
        .await
        .map_err(|e| TransportError::Io(io::Error::other(e)))?
}

/// Async accept loop over a [`SeqPacketListener`].
pub struct AsyncSeqPacketListener {
    inner: AsyncFd<SeqPacketListener>,
}

impl AsyncSeqPacketListener {
    /// Bind `path` with the default socket mode and register it with the reactor.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_listener(SeqPacketListener::bind(path)?)
    }

    /// Register an already bound listener.
    pub fn from_listener(listener: SeqPacketListener) -> Result<Self> {
        listener.set_nonblocking(true)?;
        let inner = AsyncFd::with_interest(listener, Interest::READABLE)?;
        Ok(Self { inner })
    }

    /// Wait for the next connection.
    pub async fn accept(&self) -> Result<SeqPacketSocket> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.get_inner().accept() {
                Err(TransportError::Accept(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    guard.clear_ready();
                }
                other => return other,
            }
        }
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        self.inner.get_ref().path()
    }
}

impl std::fmt::Debug for AsyncSeqPacketListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSeqPacketListener")
            .field("path", &self.path())
            .finish()
    }
}
