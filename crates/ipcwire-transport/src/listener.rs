use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::socket::SeqPacketSocket;
use crate::sys;

/// A listening `AF_UNIX`/`SOCK_SEQPACKET` socket bound to a filesystem path.
///
/// The socket file is removed on drop, but only if the path still refers to
/// the inode this listener created.
pub struct SeqPacketListener {
    fd: OwnedFd,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl SeqPacketListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind and listen on `path`.
    ///
    /// If the path already exists and is a socket, it is removed first (stale
    /// socket cleanup). Any other existing file is left alone and reported.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen on `path` with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        let len = path.as_os_str().len();
        let max = sys::max_path_len();
        if len >= max {
            return Err(TransportError::PathTooLong { path, len, max });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
            } else {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
        }

        let fd = sys::socket().map_err(|e| bind_err(&path, e))?;
        sys::bind_and_listen(fd.as_fd(), &path).map_err(|e| bind_err(&path, e))?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "listening on seqpacket socket");

        Ok(Self {
            fd,
            path,
            created_inode: (created.dev(), created.ino()),
        })
    }

    /// Accept an incoming connection.
    ///
    /// Blocks unless the listener was switched to non-blocking mode, in which
    /// case `WouldBlock` surfaces as [`TransportError::Accept`].
    pub fn accept(&self) -> Result<SeqPacketSocket> {
        let fd = sys::accept(self.fd.as_fd()).map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(SeqPacketSocket::from_accepted(fd))
    }

    /// Switch the listener between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        sys::set_nonblocking(self.fd.as_fd(), nonblocking).map_err(Into::into)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for SeqPacketListener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for SeqPacketListener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::fmt::Debug for SeqPacketListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqPacketListener")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for SeqPacketListener {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}
