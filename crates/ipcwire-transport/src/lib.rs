//! Message transport over `AF_UNIX`/`SOCK_SEQPACKET` sockets with file
//! descriptor passing.
//!
//! Each [`Message`] travels as two records: a fixed 16-byte header and a body
//! carrying the payload plus descriptors as `SCM_RIGHTS` ancillary data. The
//! blocking [`PacketTransport`] and the tokio-based `AsyncPacketTransport`
//! (feature `async`) share the same framing rules.

#[cfg(unix)]
mod error;
#[cfg(unix)]
mod fd;
#[cfg(unix)]
mod listener;
#[cfg(unix)]
mod message;
#[cfg(unix)]
mod packet;
#[cfg(unix)]
mod socket;
#[cfg(unix)]
mod sys;

#[cfg(all(unix, feature = "async"))]
mod async_io;

#[cfg(unix)]
pub use error::{FdError, Result, TransportError};
#[cfg(unix)]
pub use fd::Fd;
#[cfg(unix)]
pub use listener::SeqPacketListener;
#[cfg(unix)]
pub use message::{
    Header, Message, TransportConfig, DEFAULT_MAX_BODY, DEFAULT_MAX_FDS, HEADER_SIZE,
};
#[cfg(unix)]
pub use packet::PacketTransport;
#[cfg(unix)]
pub use socket::SeqPacketSocket;

#[cfg(all(unix, feature = "async"))]
pub use async_io::{connect_socket, AsyncPacketTransport, AsyncSeqPacketListener};
