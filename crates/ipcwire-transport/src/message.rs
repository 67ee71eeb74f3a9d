use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::fd::Fd;

/// Header record: num (4) + flags (4) + body size (4) + fd count (4) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

/// Default maximum number of descriptors per message (Linux `SCM_MAX_FD`).
pub const DEFAULT_MAX_FDS: usize = 253;

/// One framed unit of transport traffic.
///
/// `num` and `flags` are opaque to the transport; the connection layer gives
/// them meaning. Descriptors in `fds` are owned by the message: they are
/// closed when the message is dropped after sending, and handed over to the
/// receiver on read.
#[derive(Debug)]
pub struct Message {
    /// Message number.
    pub num: u32,
    /// Protocol-defined flags.
    pub flags: u32,
    /// Opaque body bytes.
    pub data: Bytes,
    /// Descriptors passed along with the body.
    pub fds: Vec<Fd>,
}

impl Message {
    /// Create a new message.
    pub fn new(num: u32, flags: u32, data: impl Into<Bytes>, fds: Vec<Fd>) -> Self {
        Self {
            num,
            flags,
            data: data.into(),
            fds,
        }
    }
}

/// The fixed-size header record that precedes every body record.
///
/// Wire format (native byte order):
/// ```text
/// ┌────────────┬────────────┬─────────────┬────────────┐
/// │ num (4B)   │ flags (4B) │ body size   │ fd count   │
/// │            │            │ (4B)        │ (4B)       │
/// └────────────┴────────────┴─────────────┴────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub num: u32,
    pub flags: u32,
    pub body_size: u32,
    pub fd_count: u32,
}

impl Header {
    /// Serialize the header in native byte order.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.num.to_ne_bytes());
        out[4..8].copy_from_slice(&self.flags.to_ne_bytes());
        out[8..12].copy_from_slice(&self.body_size.to_ne_bytes());
        out[12..16].copy_from_slice(&self.fd_count.to_ne_bytes());
        out
    }

    /// Parse a complete header record.
    pub fn parse(record: &[u8]) -> Result<Self> {
        let Ok(record) = <&[u8; HEADER_SIZE]>::try_from(record) else {
            return Err(TransportError::Read(format!(
                "incomplete header read: {}/{HEADER_SIZE} bytes",
                record.len()
            )));
        };
        let field = |index: usize| {
            let start = index * 4;
            u32::from_ne_bytes([
                record[start],
                record[start + 1],
                record[start + 2],
                record[start + 3],
            ])
        };
        Ok(Self {
            num: field(0),
            flags: field(1),
            body_size: field(2),
            fd_count: field(3),
        })
    }
}

/// Limits applied by the transport to every message.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_body_size: usize,
    /// Maximum descriptors per message. Default: 253.
    pub max_fds: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            max_fds: DEFAULT_MAX_FDS,
        }
    }
}

impl TransportConfig {
    /// Check that `msg` can be written under these limits.
    ///
    /// Writers run this before touching the socket; callers that queue
    /// messages can run it up front to fail early.
    pub fn check(&self, msg: &Message) -> Result<()> {
        let body_size = msg.data.len();
        if body_size > self.max_body_size {
            return Err(TransportError::PayloadTooLarge {
                size: body_size,
                max: self.max_body_size,
            });
        }
        if msg.fds.len() > self.max_fds {
            return Err(TransportError::Write(format!(
                "too many fds: {}, max {}",
                msg.fds.len(),
                self.max_fds
            )));
        }
        if let Some(released) = msg.fds.iter().find(|fd| !fd.is_owned()) {
            return Err(TransportError::Write(format!(
                "{released} is no longer owned and cannot be sent"
            )));
        }
        Ok(())
    }
}
