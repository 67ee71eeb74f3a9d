use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::fd::Fd;
use crate::message::{Header, Message, TransportConfig, HEADER_SIZE};
use crate::socket::SeqPacketSocket;
use crate::sys;

/// Blocking message transport over a seqpacket socket.
///
/// Every message is two records: a 16-byte header without ancillary data,
/// then the body with the descriptors attached as `SCM_RIGHTS`. Each record
/// is read or written with exactly one system call; short records are
/// framing errors and are never retried as a byte stream.
pub struct PacketTransport {
    socket: SeqPacketSocket,
    config: TransportConfig,
}

impl PacketTransport {
    /// Create a transport with default limits.
    pub fn new(socket: SeqPacketSocket) -> Self {
        Self::with_config(socket, TransportConfig::default())
    }

    /// Create a transport with explicit limits.
    pub fn with_config(socket: SeqPacketSocket, config: TransportConfig) -> Self {
        Self { socket, config }
    }

    /// Adopt a raw socket descriptor, rejecting anything but `AF_UNIX`/`SOCK_SEQPACKET`.
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        Ok(Self::new(SeqPacketSocket::try_from(fd)?))
    }

    /// Read the next message (blocking).
    ///
    /// Returns [`TransportError::NoData`] when the peer closed the socket.
    pub fn read(&self) -> Result<Message> {
        let header = read_header(self.socket.as_fd(), &self.config)?;
        let (data, fds) = read_body(self.socket.as_fd(), &header)?;
        Ok(into_message(header, data, fds))
    }

    /// Write one message (blocking). Its descriptors are closed afterwards.
    pub fn write(&self, msg: Message) -> Result<()> {
        let header = prepare_write(&msg, &self.config)?;
        write_header(self.socket.as_fd(), &header)?;
        write_body(self.socket.as_fd(), &msg)
    }

    /// Borrow the underlying socket.
    pub fn socket(&self) -> &SeqPacketSocket {
        &self.socket
    }

    /// Current limits.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Consume the transport and return the socket.
    pub fn into_inner(self) -> SeqPacketSocket {
        self.socket
    }
}

impl std::fmt::Debug for PacketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketTransport")
            .field("socket", &self.socket)
            .finish()
    }
}

pub(crate) fn into_message(header: Header, data: Bytes, fds: Vec<Fd>) -> Message {
    trace!(
        num = header.num,
        flags = header.flags,
        size = data.len(),
        fds = fds.len(),
        "message read"
    );
    Message::new(header.num, header.flags, data, fds)
}

/// Read the header record. Must be a single `recvmsg` of exactly [`HEADER_SIZE`] bytes.
pub(crate) fn read_header(fd: BorrowedFd<'_>, config: &TransportConfig) -> Result<Header> {
    let mut buf = [0u8; HEADER_SIZE];
    let record = sys::recv_record(fd, &mut buf, 0)?;

    if record.len == 0 && !record.truncated {
        return Err(TransportError::NoData);
    }
    if record.truncated || record.len != HEADER_SIZE {
        return Err(TransportError::Read(format!(
            "incomplete header read: {}/{HEADER_SIZE} bytes",
            record.len
        )));
    }
    if record.control_truncated {
        return Err(TransportError::WrongData(
            "unexpected ancillary data in header record".to_string(),
        ));
    }

    let header = Header::parse(&buf)?;
    let body_size = header.body_size as usize;
    if body_size > config.max_body_size {
        return Err(TransportError::PayloadTooLarge {
            size: body_size,
            max: config.max_body_size,
        });
    }
    if header.fd_count as usize > config.max_fds {
        return Err(TransportError::WrongData(format!(
            "too many fds: {} declared, max {}",
            header.fd_count, config.max_fds
        )));
    }
    Ok(header)
}

/// Read the body record described by `header`, including its descriptors.
///
/// Descriptors that arrive with a malformed record are closed before the
/// error is returned.
pub(crate) fn read_body(fd: BorrowedFd<'_>, header: &Header) -> Result<(Bytes, Vec<Fd>)> {
    let body_size = header.body_size as usize;
    let expected_fds = header.fd_count as usize;
    let mut buf = vec![0u8; body_size];
    let record = sys::recv_record(fd, &mut buf, expected_fds)?;
    let fds: Vec<Fd> = record.fds.into_iter().map(Fd::from).collect();

    if record.truncated || record.len != body_size {
        return Err(TransportError::Read(format!(
            "incomplete body received: {}/{body_size} bytes",
            record.len
        )));
    }
    if let Some((level, kind)) = record.foreign_control {
        return Err(TransportError::WrongData(format!(
            "unsupported ancillary data: level={level}, type={kind}"
        )));
    }
    if record.control_truncated || fds.len() != expected_fds {
        return Err(TransportError::WrongData(format!(
            "wrong number of fds: {expected_fds} expected, {} received",
            fds.len()
        )));
    }

    Ok((Bytes::from(buf), fds))
}

/// Validate an outgoing message and build its header.
pub(crate) fn prepare_write(msg: &Message, config: &TransportConfig) -> Result<Header> {
    config.check(msg)?;
    Ok(Header {
        num: msg.num,
        flags: msg.flags,
        body_size: msg.data.len() as u32,
        fd_count: msg.fds.len() as u32,
    })
}

pub(crate) fn write_header(fd: BorrowedFd<'_>, header: &Header) -> Result<()> {
    let sent = sys::send_record(fd, &header.to_bytes(), &[])?;
    if sent != HEADER_SIZE {
        return Err(TransportError::Write(format!(
            "incomplete header written: {sent}/{HEADER_SIZE} bytes"
        )));
    }
    Ok(())
}

pub(crate) fn write_body(fd: BorrowedFd<'_>, msg: &Message) -> Result<()> {
    let passed: Vec<BorrowedFd<'_>> = msg.fds.iter().filter_map(Fd::as_fd).collect();
    let sent = sys::send_record(fd, &msg.data, &passed)?;
    if sent != msg.data.len() {
        return Err(TransportError::Write(format!(
            "incomplete body written: {sent}/{} bytes",
            msg.data.len()
        )));
    }
    trace!(
        num = msg.num,
        flags = msg.flags,
        size = msg.data.len(),
        fds = msg.fds.len(),
        "message written"
    );
    Ok(())
}
