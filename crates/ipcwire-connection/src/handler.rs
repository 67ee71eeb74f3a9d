use std::future::Future;
use std::pin::Pin;

use ipcwire_codec::{CodecError, Value};
use tracing::debug;

use crate::connection::Connection;
use crate::error::ConnectionError;

/// Boxed, sendable future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error code used when a failure carries no code of its own.
pub const GENERIC_ERROR_CODE: i64 = -1;

/// Failure reported by a request or notification handler.
///
/// For requests, `code` and `message` are sent back to the caller in the
/// error response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct HandlerError {
    pub code: i64,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(GENERIC_ERROR_CODE, message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(GENERIC_ERROR_CODE, message)
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        Self::new(GENERIC_ERROR_CODE, err.to_string())
    }
}

/// Remote error responses keep their code when forwarded.
impl From<ConnectionError> for HandlerError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Response(response) => Self::new(response.code, response.message),
            ConnectionError::Handler(inner) => inner,
            other => Self::new(GENERIC_ERROR_CODE, other.to_string()),
        }
    }
}

/// Answers incoming requests.
///
/// Implemented for any `Fn(Connection, u32, String, Value) -> impl Future`
/// returning `Result<Value, HandlerError>`, including `async fn` items.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle_request<'a>(
        &'a self,
        conn: Connection,
        id: u32,
        name: String,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, HandlerError>>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Connection, u32, String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    fn handle_request<'a>(
        &'a self,
        conn: Connection,
        id: u32,
        name: String,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, HandlerError>> {
        Box::pin(self(conn, id, name, params))
    }
}

/// Consumes incoming notifications. An error closes the connection.
pub trait NotificationHandler: Send + Sync + 'static {
    fn handle_notification<'a>(
        &'a self,
        conn: Connection,
        id: u32,
        name: String,
        params: Value,
    ) -> BoxFuture<'a, Result<(), HandlerError>>;
}

impl<F, Fut> NotificationHandler for F
where
    F: Fn(Connection, u32, String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle_notification<'a>(
        &'a self,
        conn: Connection,
        id: u32,
        name: String,
        params: Value,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(self(conn, id, name, params))
    }
}

/// Default request handler: every request fails.
pub(crate) struct Unhandled;

impl RequestHandler for Unhandled {
    fn handle_request<'a>(
        &'a self,
        conn: Connection,
        id: u32,
        name: String,
        _params: Value,
    ) -> BoxFuture<'a, Result<Value, HandlerError>> {
        Box::pin(async move {
            debug!(conn = conn.num(), id, %name, "no request handler installed");
            Err(HandlerError::new(
                GENERIC_ERROR_CODE,
                format!("no handler for request '{name}'"),
            ))
        })
    }
}

impl NotificationHandler for Unhandled {
    fn handle_notification<'a>(
        &'a self,
        conn: Connection,
        id: u32,
        name: String,
        _params: Value,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            debug!(conn = conn.num(), id, %name, "notification ignored");
            Ok(())
        })
    }
}
