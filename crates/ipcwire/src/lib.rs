//! Local inter-process communication over `AF_UNIX`/`SOCK_SEQPACKET` sockets.
//!
//! # Crate Structure
//!
//! - [`transport`]: two-record message framing with file descriptor passing
//! - [`codec`]: self-describing binary values with out-of-band descriptors
//! - [`connection`]: concurrent request/response/notification sessions
//!   (behind the default `connection` feature)

/// Re-export transport types.
pub mod transport {
    pub use ipcwire_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use ipcwire_codec::*;
}

/// Re-export connection types (requires `connection` feature).
#[cfg(feature = "connection")]
pub mod connection {
    pub use ipcwire_connection::*;
}

pub use ipcwire_codec::Value;
pub use ipcwire_transport::Fd;

#[cfg(feature = "connection")]
pub use ipcwire_connection::{Connection, ConnectionError, ConnectionListener};
