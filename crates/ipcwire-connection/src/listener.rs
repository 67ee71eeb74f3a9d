use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ipcwire_transport::{AsyncSeqPacketListener, TransportConfig};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;
use crate::handler::{NotificationHandler, RequestHandler, Unhandled};

/// Accepts connections on a socket path and attaches each one.
///
/// Every accepted connection shares the listener's handlers and transport
/// limits and gets its own number, starting at 1.
pub struct ConnectionListener {
    listener: AsyncSeqPacketListener,
    request_handler: Arc<dyn RequestHandler>,
    notification_handler: Arc<dyn NotificationHandler>,
    transport_config: TransportConfig,
    next_num: AtomicU32,
}

impl ConnectionListener {
    /// Bind to `path`. Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let listener = AsyncSeqPacketListener::bind(path)?;
        Ok(Self {
            listener,
            request_handler: Arc::new(Unhandled),
            notification_handler: Arc::new(Unhandled),
            transport_config: TransportConfig::default(),
            next_num: AtomicU32::new(1),
        })
    }

    pub fn with_request_handler(mut self, handler: impl RequestHandler) -> Self {
        self.request_handler = Arc::new(handler);
        self
    }

    pub fn with_notification_handler(mut self, handler: impl NotificationHandler) -> Self {
        self.notification_handler = Arc::new(handler);
        self
    }

    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Wait for a client and attach it.
    ///
    /// Returns the attached connection and the handle of its session task.
    pub async fn accept(&self) -> Result<(Connection, JoinHandle<Result<()>>)> {
        let socket = self.listener.accept().await?;
        let num = self.next_num.fetch_add(1, Ordering::Relaxed);
        let conn = Connection::builder(num)
            .shared_handlers(
                Arc::clone(&self.request_handler),
                Arc::clone(&self.notification_handler),
            )
            .transport_config(self.transport_config.clone())
            .build();
        let session = conn.spawn_attach(socket, self.listener.path())?;
        debug!(conn = num, path = ?self.listener.path(), "accepted connection");
        Ok((conn, session))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        self.listener.path()
    }
}

impl std::fmt::Debug for ConnectionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionListener")
            .field("path", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ipcwire_codec::Value;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::handler::HandlerError;

    fn temp_socket(tag: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "ipcwire-conn-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("conn.sock");
        (dir, path)
    }

    async fn greet(
        _conn: Connection,
        _id: u32,
        name: String,
        params: Value,
    ) -> std::result::Result<Value, HandlerError> {
        let who = params.as_str().unwrap_or("nobody").to_string();
        Ok(Value::from(format!("{name}: hello {who}")))
    }

    #[tokio::test]
    async fn accepts_and_numbers_connections() {
        let (dir, path) = temp_socket("accept");
        let listener = ConnectionListener::bind(&path)
            .unwrap()
            .with_request_handler(greet);

        for expected in 1..=2u32 {
            let client = Connection::builder(100 + expected).build();
            let (accepted, connected) =
                tokio::join!(listener.accept(), client.spawn_connect(&path));
            let (server, server_session) = accepted.unwrap();
            let client_session = connected.unwrap();

            assert_eq!(server.num(), expected);
            assert_eq!(server.state(), ConnectionState::Attached);
            assert_eq!(client.address().as_deref(), Some(path.as_path()));

            let reply = client.call("greet", "rust").await.unwrap();
            assert_eq!(reply.as_str(), Some("greet: hello rust"));

            client.close();
            client_session.await.unwrap().unwrap();
            server_session.await.unwrap().unwrap();
            assert_eq!(server.state(), ConnectionState::Closed);
        }

        drop(listener);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
