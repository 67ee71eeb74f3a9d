//! Thin libc layer for `AF_UNIX`/`SOCK_SEQPACKET` sockets and `SCM_RIGHTS` records.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use libc::{c_int, c_void};

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const SEND_FLAGS: c_int = libc::MSG_EOR | libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const SEND_FLAGS: c_int = libc::MSG_EOR;

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const RECV_FLAGS: c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const RECV_FLAGS: c_int = 0;

const LISTEN_BACKLOG: c_int = 128;

fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Create a new blocking, close-on-exec seqpacket socket.
pub(crate) fn socket() -> io::Result<OwnedFd> {
    // SAFETY: socket() has no memory preconditions.
    let raw = cvt(unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET, 0) })?;
    // SAFETY: `raw` is a fresh descriptor nobody else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    set_cloexec(fd.as_raw_fd())?;
    Ok(fd)
}

/// Create a connected pair of seqpacket sockets.
pub(crate) fn socketpair() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as RawFd; 2];
    // SAFETY: `fds` has room for the two descriptors socketpair() writes.
    cvt(unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET,
            0,
            fds.as_mut_ptr(),
        )
    })?;
    // SAFETY: both descriptors were just created and are owned by nobody else.
    let pair = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(pair.0.as_raw_fd())?;
    set_cloexec(pair.1.as_raw_fd())?;
    Ok(pair)
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on an open descriptor with integer arguments only.
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    // SAFETY: as above.
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) })?;
    Ok(())
}

pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>, nonblocking: bool) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: fcntl on an open descriptor with integer arguments only.
    let flags = cvt(unsafe { libc::fcntl(raw, libc::F_GETFL) })?;
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    // SAFETY: as above.
    cvt(unsafe { libc::fcntl(raw, libc::F_SETFL, flags) })?;
    Ok(())
}

/// Maximum usable length of `sun_path` including the terminating NUL.
pub(crate) fn max_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; zeroed is a valid value.
    let addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_path.len()
}

fn sockaddr(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    // SAFETY: sockaddr_un is plain old data; zeroed is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path too long",
        ));
    }
    if bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path contains a NUL byte",
        ));
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let base = mem::size_of::<libc::sa_family_t>();
    let len = base + bytes.len() + 1;
    Ok((addr, len as libc::socklen_t))
}

pub(crate) fn connect(fd: BorrowedFd<'_>, path: &Path) -> io::Result<()> {
    let (addr, len) = sockaddr(path)?;
    loop {
        // SAFETY: `addr` is a valid sockaddr_un of `len` bytes.
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        };
        match cvt(rc) {
            Ok(_) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn bind_and_listen(fd: BorrowedFd<'_>, path: &Path) -> io::Result<()> {
    let (addr, len) = sockaddr(path)?;
    // SAFETY: `addr` is a valid sockaddr_un of `len` bytes.
    cvt(unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            len,
        )
    })?;
    // SAFETY: listen() has no memory preconditions.
    cvt(unsafe { libc::listen(fd.as_raw_fd(), LISTEN_BACKLOG) })?;
    Ok(())
}

pub(crate) fn accept(fd: BorrowedFd<'_>) -> io::Result<OwnedFd> {
    loop {
        // SAFETY: null address pointers are allowed when the peer address is not needed.
        let rc = unsafe { libc::accept(fd.as_raw_fd(), ptr::null_mut(), ptr::null_mut()) };
        match cvt(rc) {
            Ok(raw) => {
                // SAFETY: accept() returned a fresh descriptor nobody else owns.
                let accepted = unsafe { OwnedFd::from_raw_fd(raw) };
                set_cloexec(raw)?;
                return Ok(accepted);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn shutdown(fd: BorrowedFd<'_>, how: c_int) -> io::Result<()> {
    // SAFETY: shutdown() has no memory preconditions.
    cvt(unsafe { libc::shutdown(fd.as_raw_fd(), how) })?;
    Ok(())
}

/// Return `(family, type)` of a socket, e.g. `(AF_UNIX, SOCK_SEQPACKET)`.
pub(crate) fn socket_kind(fd: BorrowedFd<'_>) -> io::Result<(c_int, c_int)> {
    let mut sock_type: c_int = 0;
    let mut len = mem::size_of::<c_int>() as libc::socklen_t;
    // SAFETY: `sock_type` and `len` are valid writable pointers for the provided sizes.
    cvt(unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            (&mut sock_type as *mut c_int).cast::<c_void>(),
            &mut len,
        )
    })?;

    // SAFETY: sockaddr_storage is plain old data; zeroed is a valid value.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut addr_len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    // SAFETY: `storage` is large enough for any socket address.
    cvt(unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            (&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr>(),
            &mut addr_len,
        )
    })?;

    Ok((c_int::from(storage.ss_family), sock_type))
}

fn cmsg_space(fd_count: usize) -> usize {
    let payload = (fd_count * mem::size_of::<c_int>()) as libc::c_uint;
    // SAFETY: pure size computation.
    unsafe { libc::CMSG_SPACE(payload) as usize }
}

/// Send one record with optional `SCM_RIGHTS` descriptors.
///
/// Returns the number of data bytes the kernel accepted.
pub(crate) fn send_record(
    fd: BorrowedFd<'_>,
    data: &[u8],
    fds: &[BorrowedFd<'_>],
) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: data.as_ptr() as *mut c_void,
        iov_len: data.len(),
    };
    // SAFETY: msghdr is plain old data; zeroed is a valid value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    // u64 elements keep the control buffer aligned for cmsghdr.
    let space = if fds.is_empty() { 0 } else { cmsg_space(fds.len()) };
    let mut control = vec![0u64; space.div_ceil(mem::size_of::<u64>())];
    if space > 0 {
        msg.msg_control = control.as_mut_ptr().cast::<c_void>();
        msg.msg_controllen = space as _;

        let payload = (fds.len() * mem::size_of::<c_int>()) as libc::c_uint;
        // SAFETY: the control buffer is at least CMSG_SPACE(payload) bytes and aligned,
        // so the first header and its data area are in bounds.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(payload) as _;
            let slots = libc::CMSG_DATA(cmsg).cast::<c_int>();
            for (index, passed) in fds.iter().enumerate() {
                ptr::write_unaligned(slots.add(index), passed.as_raw_fd());
            }
        }
    }

    loop {
        // SAFETY: `msg` points at live iovec and control buffers for the duration of the call.
        let sent = unsafe { libc::sendmsg(fd.as_raw_fd(), &msg, SEND_FLAGS) };
        if sent < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(sent as usize);
    }
}

/// Outcome of one `recvmsg` call.
#[derive(Debug)]
pub(crate) struct RecvRecord {
    /// Data bytes received.
    pub len: usize,
    /// Descriptors received in `SCM_RIGHTS` messages, already owned.
    pub fds: Vec<OwnedFd>,
    /// The record was larger than the buffer.
    pub truncated: bool,
    /// Control data did not fit; descriptors may have been dropped by the kernel.
    pub control_truncated: bool,
    /// `(level, type)` of the first control message that was not `SCM_RIGHTS`.
    pub foreign_control: Option<(c_int, c_int)>,
}

/// Receive one record, accepting up to `max_fds` descriptors.
pub(crate) fn recv_record(
    fd: BorrowedFd<'_>,
    buf: &mut [u8],
    max_fds: usize,
) -> io::Result<RecvRecord> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast::<c_void>(),
        iov_len: buf.len(),
    };
    // SAFETY: msghdr is plain old data; zeroed is a valid value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    let space = if max_fds == 0 { 0 } else { cmsg_space(max_fds) };
    let mut control = vec![0u64; space.div_ceil(mem::size_of::<u64>())];
    if space > 0 {
        msg.msg_control = control.as_mut_ptr().cast::<c_void>();
        msg.msg_controllen = space as _;
    }

    let len = loop {
        // SAFETY: `msg` points at live iovec and control buffers for the duration of the call.
        let received = unsafe { libc::recvmsg(fd.as_raw_fd(), &mut msg, RECV_FLAGS) };
        if received < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        break received as usize;
    };

    let mut fds = Vec::new();
    let mut foreign_control = None;
    if space > 0 && msg.msg_controllen as usize > 0 {
        // SAFETY: the kernel filled `msg_controllen` bytes of the control buffer with
        // well-formed cmsg headers; CMSG_FIRSTHDR/CMSG_NXTHDR stay within that range.
        unsafe {
            let header_len = libc::CMSG_LEN(0) as usize;
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                let level = (*cmsg).cmsg_level;
                let kind = (*cmsg).cmsg_type;
                if level == libc::SOL_SOCKET && kind == libc::SCM_RIGHTS {
                    let payload = ((*cmsg).cmsg_len as usize).saturating_sub(header_len);
                    let count = payload / mem::size_of::<c_int>();
                    let slots = libc::CMSG_DATA(cmsg).cast::<c_int>();
                    for index in 0..count {
                        let raw = ptr::read_unaligned(slots.add(index));
                        fds.push(OwnedFd::from_raw_fd(raw));
                    }
                } else if foreign_control.is_none() {
                    foreign_control = Some((level, kind));
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }
    }
    Ok(RecvRecord {
        len,
        fds,
        truncated: msg.msg_flags & libc::MSG_TRUNC != 0,
        control_truncated: msg.msg_flags & libc::MSG_CTRUNC != 0,
        foreign_control,
    })
}
