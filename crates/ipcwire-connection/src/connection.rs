use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ipcwire_codec::{decode, encode, Value};
use ipcwire_transport::{
    connect_socket, AsyncPacketTransport, Message, SeqPacketSocket, TransportConfig,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::counter::WrappedCounter;
use crate::error::{ConnectionError, ResponseError, Result};
use crate::flags::MessageFlags;
use crate::handler::{NotificationHandler, RequestHandler, Unhandled, GENERIC_ERROR_CODE};

/// Lifecycle of a [`Connection`]. A connection runs at most one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Attached,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Attached => "attached",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

type Slot = oneshot::Sender<Result<Value>>;

/// Work for the writer task, processed in enqueue order.
enum Outgoing {
    Message(Message),
    /// Acknowledged once everything enqueued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// A duplex request/response/notification channel over one seqpacket socket.
///
/// `Connection` is a cheap handle: clones share the same session. Requests
/// are correlated with responses by message number, so any number of calls
/// may be in flight at once and may be answered in any order.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    num: u32,
    request_handler: Arc<dyn RequestHandler>,
    notification_handler: Arc<dyn NotificationHandler>,
    transport_config: TransportConfig,
    shared: Mutex<Shared>,
}

struct Shared {
    state: ConnectionState,
    address: Option<PathBuf>,
    counter: WrappedCounter,
    pending: HashMap<u32, Slot>,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    cancel: Option<CancellationToken>,
}

impl Shared {
    fn check_attached(&self) -> Result<()> {
        match self.state {
            ConnectionState::Attached => Ok(()),
            ConnectionState::Idle => Err(ConnectionError::NotAttached),
            ConnectionState::Closing | ConnectionState::Closed => Err(ConnectionError::Closed),
        }
    }

    /// Next message number that is not waiting for a response.
    fn next_num(&mut self) -> u32 {
        loop {
            let num = self.counter.next_value();
            if !self.pending.contains_key(&num) {
                return num;
            }
        }
    }

    fn enqueue(&self, msg: Message) -> Result<()> {
        self.push(Outgoing::Message(msg))
    }

    fn push(&self, item: Outgoing) -> Result<()> {
        self.check_attached()?;
        let outgoing = self.outgoing.as_ref().ok_or(ConnectionError::Closed)?;
        outgoing.send(item).map_err(|_| ConnectionError::Closed)
    }
}

/// Builder for [`Connection`].
pub struct ConnectionBuilder {
    num: u32,
    request_handler: Arc<dyn RequestHandler>,
    notification_handler: Arc<dyn NotificationHandler>,
    transport_config: TransportConfig,
}

impl ConnectionBuilder {
    /// Handler for incoming requests. Without one, every request is answered
    /// with an error response.
    pub fn request_handler(mut self, handler: impl RequestHandler) -> Self {
        self.request_handler = Arc::new(handler);
        self
    }

    /// Handler for incoming notifications. Without one, notifications are ignored.
    pub fn notification_handler(mut self, handler: impl NotificationHandler) -> Self {
        self.notification_handler = Arc::new(handler);
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub(crate) fn shared_handlers(
        mut self,
        request_handler: Arc<dyn RequestHandler>,
        notification_handler: Arc<dyn NotificationHandler>,
    ) -> Self {
        self.request_handler = request_handler;
        self.notification_handler = notification_handler;
        self
    }

    pub fn build(self) -> Connection {
        Connection {
            inner: Arc::new(Inner {
                num: self.num,
                request_handler: self.request_handler,
                notification_handler: self.notification_handler,
                transport_config: self.transport_config,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Idle,
                    address: None,
                    counter: WrappedCounter::message_nums(),
                    pending: HashMap::new(),
                    outgoing: None,
                    cancel: None,
                }),
            }),
        }
    }
}

impl Connection {
    /// Start building a connection identified by `num`.
    pub fn builder(num: u32) -> ConnectionBuilder {
        ConnectionBuilder {
            num,
            request_handler: Arc::new(Unhandled),
            notification_handler: Arc::new(Unhandled),
            transport_config: TransportConfig::default(),
        }
    }

    /// Connection number, used in diagnostics.
    pub fn num(&self) -> u32 {
        self.inner.num
    }

    /// Address of the remote endpoint, once attached.
    pub fn address(&self) -> Option<PathBuf> {
        self.lock().address.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Number of calls waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.lock().pending.len()
    }

    /// Connect to `address` and run the session until the connection closes.
    ///
    /// Returns `Ok(())` after a local [`close`](Self::close) or when the peer
    /// closes the socket, and the fatal error otherwise.
    pub async fn connect(&self, address: impl AsRef<Path>) -> Result<()> {
        let session = self.connect_session(address.as_ref()).await?;
        session.run().await
    }

    /// Attach an already connected socket and run the session until the
    /// connection closes. Same return contract as [`connect`](Self::connect).
    pub async fn attach(
        &self,
        socket: SeqPacketSocket,
        address: impl Into<PathBuf>,
    ) -> Result<()> {
        let session = self.start(socket, address.into())?;
        session.run().await
    }

    /// Connect to `address` and run the session on a spawned task.
    ///
    /// When this returns the connection is attached.
    pub async fn spawn_connect(
        &self,
        address: impl AsRef<Path>,
    ) -> Result<JoinHandle<Result<()>>> {
        let session = self.connect_session(address.as_ref()).await?;
        Ok(tokio::spawn(session.run()))
    }

    /// Attach a socket and run the session on a spawned task.
    ///
    /// The attach itself happens before this returns, so the connection can
    /// be used immediately. Must be called from within a tokio runtime.
    pub fn spawn_attach(
        &self,
        socket: SeqPacketSocket,
        address: impl Into<PathBuf>,
    ) -> Result<JoinHandle<Result<()>>> {
        let session = self.start(socket, address.into())?;
        Ok(tokio::spawn(session.run()))
    }

    /// Send a request and wait for its response.
    ///
    /// The payload is `[name, params]`. An error response from the peer is
    /// returned as [`ConnectionError::Response`]. Dropping the returned future
    /// forgets the request; a late response is then discarded.
    pub async fn call(&self, name: &str, params: impl Into<Value>) -> Result<Value> {
        self.lock().check_attached()?;
        let envelope = vec![name.into(), params.into()];
        let mut msg = self.message(0, MessageFlags::REQUEST, envelope)?;

        let (slot, response) = oneshot::channel();
        let num = {
            let mut shared = self.lock();
            shared.check_attached()?;
            let num = shared.next_num();
            shared.pending.insert(num, slot);
            msg.num = num;
            if let Err(e) = shared.enqueue(msg) {
                shared.pending.remove(&num);
                return Err(e);
            }
            num
        };
        trace!(conn = self.num(), num, name, "request sent");

        let mut guard = PendingGuard {
            conn: self,
            num,
            response,
        };
        (&mut guard.response)
            .await
            .unwrap_or(Err(ConnectionError::Closed))
    }

    /// Send a notification without waiting for it to be written.
    pub fn notify(&self, name: &str, params: impl Into<Value>) -> Result<()> {
        self.lock().check_attached()?;
        let envelope = vec![name.into(), params.into()];
        let mut msg = self.message(0, MessageFlags::NOTIFICATION, envelope)?;

        let mut shared = self.lock();
        msg.num = shared.next_num();
        trace!(conn = self.num(), num = msg.num, name, "notification queued");
        shared.enqueue(msg)
    }

    /// Wait until every message enqueued so far has been written to the socket.
    pub async fn flush(&self) -> Result<()> {
        let (done, written) = oneshot::channel();
        self.lock().push(Outgoing::Flush(done))?;
        written.await.map_err(|_| ConnectionError::Closed)
    }

    /// Answer request `id` with a value: `[0, null, value]`.
    pub fn send_response(&self, id: u32, value: impl Into<Value>) -> Result<()> {
        self.lock().check_attached()?;
        let msg = self.message(
            id,
            MessageFlags::RESPONSE,
            vec![Value::Int(0), Value::Null, value.into()],
        )?;
        self.lock().enqueue(msg)
    }

    /// Answer request `id` with an error: `[code, message, null]`.
    pub fn send_error(&self, id: u32, code: i64, message: &str) -> Result<()> {
        self.lock().check_attached()?;
        let msg = self.message(
            id,
            MessageFlags::RESPONSE,
            vec![Value::Int(code), Value::from(message), Value::Null],
        )?;
        self.lock().enqueue(msg)
    }

    /// Close the connection.
    ///
    /// Stops the running session, fails every pending call with
    /// [`ConnectionError::Closed`] and closes the socket. Safe to call more
    /// than once and from inside a handler.
    pub fn close(&self) {
        let mut shared = self.lock();
        match shared.state {
            ConnectionState::Idle => {
                shared.state = ConnectionState::Closed;
                debug!(conn = self.num(), "closed before attach");
            }
            ConnectionState::Attached => {
                shared.state = ConnectionState::Closing;
                if let Some(cancel) = &shared.cancel {
                    cancel.cancel();
                }
                debug!(conn = self.num(), "closing");
            }
            ConnectionState::Closing | ConnectionState::Closed => {}
        }
    }

    /// Encode `items` as an array payload that fits the transport limits.
    fn message(&self, num: u32, flags: MessageFlags, items: Vec<Value>) -> Result<Message> {
        let (data, fds) = encode(Value::Array(items))?;
        let msg = Message::new(num, flags.bits(), data, fds);
        self.inner.transport_config.check(&msg)?;
        Ok(msg)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn connect_session(&self, address: &Path) -> Result<Session> {
        if self.state() != ConnectionState::Idle {
            return Err(self.attach_refusal());
        }
        let socket = connect_socket(address.to_path_buf()).await?;
        self.start(socket, address.to_path_buf())
    }

    fn attach_refusal(&self) -> ConnectionError {
        match self.state() {
            ConnectionState::Closed => ConnectionError::Closed,
            _ => ConnectionError::AlreadyAttached,
        }
    }

    /// Move from `Idle` to `Attached` and prepare the session.
    fn start(&self, socket: SeqPacketSocket, address: PathBuf) -> Result<Session> {
        let mut shared = self.lock();
        match shared.state {
            ConnectionState::Idle => {}
            ConnectionState::Closed => return Err(ConnectionError::Closed),
            ConnectionState::Attached | ConnectionState::Closing => {
                return Err(ConnectionError::AlreadyAttached)
            }
        }

        let transport = Arc::new(AsyncPacketTransport::with_config(
            socket,
            self.inner.transport_config.clone(),
        )?);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        shared.state = ConnectionState::Attached;
        shared.address = Some(address.clone());
        shared.outgoing = Some(outgoing_tx);
        shared.cancel = Some(cancel.clone());
        drop(shared);

        debug!(conn = self.num(), ?address, "attached");
        Ok(Session {
            conn: self.clone(),
            transport,
            outgoing: outgoing_rx,
            cancel,
        })
    }

    async fn dispatch(self, msg: Message) -> Result<()> {
        let flags = MessageFlags::from_bits_retain(msg.flags);
        trace!(
            conn = self.num(),
            num = msg.num,
            flags = msg.flags,
            size = msg.data.len(),
            "dispatching message"
        );
        if flags.contains(MessageFlags::REQUEST) {
            self.dispatch_request(msg).await;
            Ok(())
        } else if flags.contains(MessageFlags::NOTIFICATION) {
            self.dispatch_notification(msg).await
        } else if flags.contains(MessageFlags::RESPONSE) {
            self.dispatch_response(msg)
        } else {
            Err(ConnectionError::Protocol(format!(
                "message {} has unknown type (flags {:#x})",
                msg.num, msg.flags
            )))
        }
    }

    /// Requests never fail the session: every problem becomes an error response.
    async fn dispatch_request(&self, msg: Message) {
        let id = msg.num;
        let (name, params) = match decode(&msg.data, msg.fds)
            .map_err(ConnectionError::from)
            .and_then(split_envelope)
        {
            Ok(request) => request,
            Err(e) => {
                warn!(conn = self.num(), id, error = %e, "rejecting malformed request");
                self.reply_error(id, GENERIC_ERROR_CODE, &e.to_string());
                return;
            }
        };

        let handler = Arc::clone(&self.inner.request_handler);
        let outcome = handler
            .handle_request(self.clone(), id, name, params)
            .await;
        match outcome {
            Ok(value) => match self.send_response(id, value) {
                Err(e @ (ConnectionError::Codec(_) | ConnectionError::Transport(_))) => {
                    warn!(conn = self.num(), id, error = %e, "response could not be sent");
                    self.reply_error(id, GENERIC_ERROR_CODE, &format!("invalid response: {e}"));
                }
                Err(e) => debug!(conn = self.num(), id, error = %e, "response dropped"),
                Ok(()) => {}
            },
            Err(e) => self.reply_error(id, e.code, &e.message),
        }
    }

    fn reply_error(&self, id: u32, code: i64, message: &str) {
        let sent = match self.send_error(id, code, message) {
            Err(ConnectionError::Transport(e)) => {
                warn!(conn = self.num(), id, error = %e, "error response too large");
                self.send_error(id, code, "error message exceeds transport limits")
            }
            other => other,
        };
        if let Err(e) = sent {
            debug!(conn = self.num(), id, error = %e, "error response dropped");
        }
    }

    async fn dispatch_notification(&self, msg: Message) -> Result<()> {
        let id = msg.num;
        let (name, params) = split_envelope(decode(&msg.data, msg.fds)?)?;
        let handler = Arc::clone(&self.inner.notification_handler);
        handler
            .handle_notification(self.clone(), id, name, params)
            .await?;
        Ok(())
    }

    fn dispatch_response(&self, msg: Message) -> Result<()> {
        let id = msg.num;
        let result = split_response(decode(&msg.data, msg.fds)?)?;
        let slot = self.lock().pending.remove(&id);
        match slot {
            Some(slot) => {
                trace!(conn = self.num(), id, "response received");
                // The caller may have gone away since.
                let _ = slot.send(result);
            }
            None => warn!(conn = self.num(), id, "response to unknown request ignored"),
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("Connection")
            .field("num", &self.inner.num)
            .field("state", &shared.state)
            .field("address", &shared.address)
            .field("pending", &shared.pending.len())
            .finish()
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Conn#{}", self.inner.num)
    }
}

/// Removes a call's slot if its future is dropped before the response arrives.
struct PendingGuard<'a> {
    conn: &'a Connection,
    num: u32,
    response: oneshot::Receiver<Result<Value>>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.response.close();
        let mut shared = self.conn.lock();
        // A closed slot belongs to this call; an open one was reissued to a newer call.
        if shared
            .pending
            .get(&self.num)
            .is_some_and(oneshot::Sender::is_closed)
        {
            shared.pending.remove(&self.num);
        }
    }
}

/// `[name, params]` with a non-empty string name.
fn split_envelope(value: Value) -> Result<(String, Value)> {
    let items = value.into_array().map_err(|other| {
        ConnectionError::Protocol(format!("expected [name, params], got {}", other.kind()))
    })?;
    let [name, params]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
        ConnectionError::Protocol(format!(
            "expected [name, params], got {} elements",
            items.len()
        ))
    })?;
    match name.into_string() {
        Ok(name) if !name.is_empty() => Ok((name, params)),
        Ok(_) => Err(ConnectionError::Protocol(
            "message name must not be empty".to_string(),
        )),
        Err(other) => Err(ConnectionError::Protocol(format!(
            "message name must be a string, got {}",
            other.kind()
        ))),
    }
}

/// `[code, reason, value]`; code 0 is success.
fn split_response(value: Value) -> Result<Result<Value>> {
    let items = value.into_array().map_err(|other| {
        ConnectionError::Protocol(format!(
            "expected [code, reason, value], got {}",
            other.kind()
        ))
    })?;
    let [code, reason, value]: [Value; 3] = items.try_into().map_err(|items: Vec<Value>| {
        ConnectionError::Protocol(format!(
            "expected [code, reason, value], got {} elements",
            items.len()
        ))
    })?;
    let code = code.as_int().ok_or_else(|| {
        ConnectionError::Protocol(format!("response code must be an int, got {}", code.kind()))
    })?;
    if code == 0 {
        return Ok(Ok(value));
    }
    let message = match reason.into_string() {
        Ok(message) => message,
        Err(Value::Null) => String::new(),
        Err(other) => {
            return Err(ConnectionError::Protocol(format!(
                "response reason must be a string, got {}",
                other.kind()
            )))
        }
    };
    Ok(Err(ConnectionError::Response(ResponseError { code, message })))
}

/// One attached run of a connection.
struct Session {
    conn: Connection,
    transport: Arc<AsyncPacketTransport>,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self) -> Result<()> {
        let Session {
            conn,
            transport,
            outgoing,
            cancel,
        } = self;

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let (incoming_tx, mut incoming) = mpsc::channel(1);
        tasks.spawn(read_messages(Arc::clone(&transport), incoming_tx));
        tasks.spawn(write_messages(Arc::clone(&transport), outgoing));

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                Some(msg) = incoming.recv() => {
                    tasks.spawn(conn.clone().dispatch(msg));
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Err(e),
                    Err(e) if e.is_panic() => {
                        break Err(ConnectionError::Protocol(format!("session task panicked: {e}")))
                    }
                    Err(_) => {}
                },
                else => break Ok(()),
            }
        };

        let outcome = match outcome {
            Err(e) if e.is_peer_closed() => {
                debug!(conn = conn.num(), "peer closed the connection");
                Ok(())
            }
            Err(e) => {
                warn!(conn = conn.num(), error = %e, "connection failed");
                Err(e)
            }
            Ok(()) => Ok(()),
        };

        shutdown(&conn, &cancel, &mut tasks, transport).await;
        outcome
    }
}

async fn shutdown(
    conn: &Connection,
    cancel: &CancellationToken,
    tasks: &mut JoinSet<Result<()>>,
    transport: Arc<AsyncPacketTransport>,
) {
    let pending = {
        let mut shared = conn.lock();
        shared.state = ConnectionState::Closing;
        shared.outgoing = None;
        std::mem::take(&mut shared.pending)
    };
    cancel.cancel();
    tasks.shutdown().await;

    for (_, slot) in pending {
        let _ = slot.send(Err(ConnectionError::Closed));
    }

    if let Err(e) = transport.shutdown() {
        trace!(conn = conn.num(), error = %e, "socket shutdown failed");
    }
    drop(transport);
    let mut shared = conn.lock();
    shared.cancel = None;
    shared.state = ConnectionState::Closed;
    drop(shared);
    debug!(conn = conn.num(), "closed");
}

async fn read_messages(
    transport: Arc<AsyncPacketTransport>,
    incoming: mpsc::Sender<Message>,
) -> Result<()> {
    loop {
        let msg = transport.read().await?;
        if incoming.send(msg).await.is_err() {
            return Ok(());
        }
    }
}

async fn write_messages(
    transport: Arc<AsyncPacketTransport>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) -> Result<()> {
    while let Some(item) = outgoing.recv().await {
        match item {
            Outgoing::Message(msg) => transport.write(msg).await?,
            Outgoing::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    Ok(())
}
