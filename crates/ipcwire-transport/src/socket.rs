use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::sys;

/// A connected `AF_UNIX`/`SOCK_SEQPACKET` socket.
///
/// Seqpacket sockets preserve record boundaries, which the two-record message
/// framing relies on. The socket is closed when this value is dropped.
pub struct SeqPacketSocket {
    fd: OwnedFd,
}

impl SeqPacketSocket {
    /// Connect to a listening seqpacket socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let max = sys::max_path_len();
        let len = path.as_os_str().len();
        if len >= max {
            return Err(TransportError::PathTooLong {
                path: path.to_path_buf(),
                len,
                max,
            });
        }

        let fd = sys::socket().map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        sys::connect(fd.as_fd(), path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to seqpacket socket");
        Ok(Self { fd })
    }

    /// Create a connected pair of sockets.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = sys::socketpair()?;
        Ok((Self { fd: left }, Self { fd: right }))
    }

    /// Wrap an accepted descriptor that is known to be a seqpacket socket.
    pub(crate) fn from_accepted(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Switch the socket between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        sys::set_nonblocking(self.fd.as_fd(), nonblocking).map_err(Into::into)
    }

    /// Shut down both directions; the peer observes end of stream.
    pub fn shutdown(&self) -> Result<()> {
        sys::shutdown(self.fd.as_fd(), libc::SHUT_RDWR).map_err(Into::into)
    }

    /// Send one record with attached descriptors. Returns the bytes sent.
    pub fn send_record(&self, data: &[u8], fds: &[BorrowedFd<'_>]) -> std::io::Result<usize> {
        sys::send_record(self.fd.as_fd(), data, fds)
    }
}

impl TryFrom<OwnedFd> for SeqPacketSocket {
    type Error = TransportError;

    /// Adopt an existing descriptor, verifying it is an `AF_UNIX` seqpacket socket.
    ///
    /// On mismatch the descriptor is closed and `WrongSocket` is returned.
    fn try_from(fd: OwnedFd) -> Result<Self> {
        let (family, kind) = sys::socket_kind(fd.as_fd()).map_err(|e| {
            TransportError::WrongSocket(format!("not a socket: {e}"))
        })?;
        if family != libc::AF_UNIX || kind != libc::SOCK_SEQPACKET {
            return Err(TransportError::WrongSocket(format!(
                "unsupported socket: (AF_UNIX={}, SOCK_SEQPACKET={}) expected, ({family}, {kind}) passed",
                libc::AF_UNIX,
                libc::SOCK_SEQPACKET
            )));
        }
        Ok(Self { fd })
    }
}

impl AsFd for SeqPacketSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for SeqPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl IntoRawFd for SeqPacketSocket {
    fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

impl From<SeqPacketSocket> for OwnedFd {
    fn from(socket: SeqPacketSocket) -> Self {
        socket.fd
    }
}

impl std::fmt::Debug for SeqPacketSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqPacketSocket")
            .field("fd", &self.fd.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_exchanges_records() {
        let (left, right) = SeqPacketSocket::pair().unwrap();
        assert_eq!(left.send_record(b"hello", &[]).unwrap(), 5);

        let mut buf = [0u8; 16];
        let rec = sys::recv_record(right.as_fd(), &mut buf, 0).unwrap();
        assert_eq!(&buf[..rec.len], b"hello");
        assert!(!rec.truncated);
    }

    #[test]
    fn records_keep_boundaries() {
        let (left, right) = SeqPacketSocket::pair().unwrap();
        left.send_record(b"one", &[]).unwrap();
        left.send_record(b"three", &[]).unwrap();

        let mut buf = [0u8; 16];
        let first = sys::recv_record(right.as_fd(), &mut buf, 0).unwrap();
        assert_eq!(first.len, 3);
        let second = sys::recv_record(right.as_fd(), &mut buf, 0).unwrap();
        assert_eq!(&buf[..second.len], b"three");
    }

    #[test]
    fn try_from_accepts_seqpacket() {
        let (left, _right) = SeqPacketSocket::pair().unwrap();
        let fd = OwnedFd::from(left);
        assert!(SeqPacketSocket::try_from(fd).is_ok());
    }

    #[test]
    fn try_from_rejects_stream_socket() {
        let (stream, _other) = std::os::unix::net::UnixStream::pair().unwrap();
        let err = SeqPacketSocket::try_from(OwnedFd::from(stream)).unwrap_err();
        assert!(matches!(err, TransportError::WrongSocket(_)));
    }

    #[test]
    fn try_from_rejects_regular_file() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let err = SeqPacketSocket::try_from(OwnedFd::from(file)).unwrap_err();
        assert!(matches!(err, TransportError::WrongSocket(_)));
    }

    #[test]
    fn connect_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = SeqPacketSocket::connect(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn connect_missing_path_fails() {
        let result = SeqPacketSocket::connect("/tmp/ipcwire-does-not-exist.sock");
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn shutdown_signals_end_of_stream() {
        let (left, right) = SeqPacketSocket::pair().unwrap();
        left.shutdown().unwrap();
        let mut buf = [0u8; 4];
        let rec = sys::recv_record(right.as_fd(), &mut buf, 0).unwrap();
        assert_eq!(rec.len, 0);
    }
}
