use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use crate::error::FdError;

/// An owned file descriptor with explicit transfer and close semantics.
///
/// The descriptor is closed exactly once: either by [`Fd::close`] or when the
/// value is dropped, unless ownership was moved out with [`Fd::take`] first.
/// The descriptor number stays readable after the descriptor is released,
/// which keeps equality and diagnostics stable.
pub struct Fd {
    raw: RawFd,
    owned: Option<OwnedFd>,
}

impl Fd {
    /// Wrap an owned descriptor.
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            raw: fd.as_raw_fd(),
            owned: Some(fd),
        }
    }

    /// Duplicate a borrowed descriptor into a new owned one.
    pub fn duplicate(fd: impl AsFd) -> Result<Self, FdError> {
        let owned = fd.as_fd().try_clone_to_owned()?;
        Ok(Self::new(owned))
    }

    /// Duplicate a raw descriptor number owned by someone else.
    ///
    /// The source descriptor is left untouched. Fails for negative numbers and
    /// for numbers that are not open descriptors.
    pub fn duplicate_raw(raw: RawFd) -> Result<Self, FdError> {
        if raw < 0 {
            return Err(FdError::Invalid(raw));
        }
        // SAFETY: F_DUPFD_CLOEXEC does not touch memory; an invalid descriptor
        // is reported as EBADF.
        let dup = unsafe { libc::fcntl(raw, libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        // SAFETY: `dup` is a fresh descriptor returned by fcntl and owned by nobody else.
        Ok(Self::new(unsafe { OwnedFd::from_raw_fd(dup) }))
    }

    /// The descriptor number, also after it was taken or closed.
    pub fn raw(&self) -> RawFd {
        self.raw
    }

    /// Whether this value still owns (and will close) the descriptor.
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Borrow the descriptor while it is owned.
    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.owned.as_ref().map(AsFd::as_fd)
    }

    /// Create an independent duplicate of the owned descriptor.
    pub fn try_clone(&self) -> Result<Self, FdError> {
        match &self.owned {
            Some(fd) => Self::duplicate(fd),
            None => Err(FdError::NotOwned(self.raw)),
        }
    }

    /// Move ownership out, leaving this value released.
    ///
    /// The caller becomes responsible for the descriptor. Fails once the
    /// descriptor was already taken or closed.
    pub fn take(&mut self) -> Result<OwnedFd, FdError> {
        self.owned.take().ok_or(FdError::NotOwned(self.raw))
    }

    /// Move ownership into a new wrapper, leaving this one released.
    pub fn transfer(&mut self) -> Fd {
        Fd {
            raw: self.raw,
            owned: self.owned.take(),
        }
    }

    /// Close the descriptor early. Calling this again has no effect.
    pub fn close(&mut self) -> Result<(), FdError> {
        if let Some(fd) = self.owned.take() {
            let raw = fd.into_raw_fd();
            // SAFETY: `raw` came from an OwnedFd we just released, so this is
            // the only close of that descriptor.
            if unsafe { libc::close(raw) } != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }
        Ok(())
    }

    /// Consume the wrapper, returning the descriptor if it is still owned.
    pub fn into_owned(mut self) -> Option<OwnedFd> {
        self.owned.take()
    }
}

impl From<OwnedFd> for Fd {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

impl From<std::fs::File> for Fd {
    fn from(file: std::fs::File) -> Self {
        Self::new(OwnedFd::from(file))
    }
}

impl FromRawFd for Fd {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        // SAFETY: forwarded to the caller's contract.
        Self::new(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

impl PartialEq for Fd {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Fd {}

impl fmt::Debug for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fd")
            .field("raw", &self.raw)
            .field("owned", &self.is_owned())
            .finish()
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.raw)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A pipe whose read end is non-blocking, so closing the write end is observable.
    pub(crate) fn pipe() -> (Fd, Fd) {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: `fds` has room for the two descriptors pipe() writes.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        // SAFETY: both descriptors were just created and are owned by nobody else.
        let (read, write) = unsafe { (Fd::from_raw_fd(fds[0]), Fd::from_raw_fd(fds[1])) };
        // SAFETY: plain flag update on an open descriptor.
        unsafe {
            let flags = libc::fcntl(read.raw(), libc::F_GETFL);
            libc::fcntl(read.raw(), libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        (read, write)
    }

    /// True once every write end of the pipe is closed.
    pub(crate) fn writer_closed(read: &Fd) -> bool {
        let mut byte = 0u8;
        // SAFETY: one-byte read into a valid buffer.
        let n = unsafe { libc::read(read.raw(), (&mut byte as *mut u8).cast(), 1) };
        n == 0
    }

    pub(crate) fn inode_of(fd: BorrowedFd<'_>) -> (u64, u64) {
        let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
        // SAFETY: `stat` is a valid out pointer and the descriptor is open.
        let rc = unsafe { libc::fstat(fd.as_raw_fd(), stat.as_mut_ptr()) };
        assert_eq!(rc, 0);
        // SAFETY: fstat succeeded and initialized the struct.
        let stat = unsafe { stat.assume_init() };
        (stat.st_dev as u64, stat.st_ino as u64)
    }

    #[test]
    fn drop_closes_owned_descriptor() {
        let (read, write) = pipe();
        assert!(!writer_closed(&read));
        drop(write);
        assert!(writer_closed(&read));
    }

    #[test]
    fn double_close_is_noop() {
        let (read, mut write) = pipe();
        let raw = write.raw();
        write.close().unwrap();
        assert!(!write.is_owned());
        assert!(writer_closed(&read));
        write.close().unwrap();
        assert_eq!(write.raw(), raw);
    }

    #[test]
    fn take_after_close_fails() {
        let (_read, mut write) = pipe();
        write.close().unwrap();
        assert!(matches!(write.take(), Err(FdError::NotOwned(_))));
    }

    #[test]
    fn take_transfers_ownership() {
        let (read, mut write) = pipe();
        let owned = write.take().unwrap();
        assert!(!write.is_owned());
        drop(write);
        assert!(!writer_closed(&read), "taken descriptor must survive the wrapper");
        drop(owned);
        assert!(writer_closed(&read));
    }

    #[test]
    fn transfer_leaves_source_released() {
        let (read, mut write) = pipe();
        let moved = write.transfer();
        assert!(!write.is_owned());
        assert!(moved.is_owned());
        assert_eq!(moved.raw(), write.raw());
        drop(write);
        assert!(!writer_closed(&read));
        drop(moved);
        assert!(writer_closed(&read));
    }

    #[test]
    fn second_take_fails() {
        let (_read, mut write) = pipe();
        let _owned = write.take().unwrap();
        assert!(matches!(write.take(), Err(FdError::NotOwned(_))));
    }

    #[test]
    fn try_clone_keeps_file_identity() {
        let (read, write) = pipe();
        let clone = write.try_clone().unwrap();
        assert_ne!(write.raw(), clone.raw());
        assert_eq!(
            inode_of(write.as_fd().unwrap()),
            inode_of(clone.as_fd().unwrap())
        );
        drop(write);
        assert!(!writer_closed(&read), "clone keeps the pipe open");
        drop(clone);
        assert!(writer_closed(&read));
    }

    #[test]
    fn duplicate_raw_rejects_negative() {
        assert!(matches!(Fd::duplicate_raw(-1), Err(FdError::Invalid(-1))));
    }

    #[test]
    fn duplicate_raw_leaves_source_open() {
        let (read, write) = pipe();
        let dup = Fd::duplicate_raw(write.raw()).unwrap();
        drop(dup);
        assert!(!writer_closed(&read));
        assert!(write.is_owned());
    }

    #[test]
    fn into_owned_after_take_is_none() {
        let (_read, mut write) = pipe();
        let _owned = write.take().unwrap();
        assert!(write.into_owned().is_none());
    }

    #[test]
    fn equality_and_display_use_descriptor_number() {
        let (read, _write) = pipe();
        let raw = read.raw();
        assert_eq!(read.to_string(), format!("fd:{raw}"));
        let mut other = read;
        let owned = other.take().unwrap();
        let rewrapped = Fd::new(owned);
        assert_eq!(other, rewrapped);
    }
}
