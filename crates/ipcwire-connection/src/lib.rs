//! Request/response/notification multiplexing over a seqpacket transport.
//!
//! A [`Connection`] attaches to one socket and runs a session: a reader task,
//! a writer task, and one task per incoming message, all owned by the session
//! and joined before it returns. Requests carry `[name, params]`, responses
//! `[code, reason, value]`, notifications `[name, params]`; the message type
//! travels in the transport header's flags word ([`MessageFlags`]).

pub mod connection;
pub mod counter;
pub mod error;
pub mod flags;
pub mod handler;
pub mod listener;

pub use connection::{Connection, ConnectionBuilder, ConnectionState};
pub use counter::{CounterRangeError, WrappedCounter, FIRST_MESSAGE_NUM, LAST_MESSAGE_NUM};
pub use error::{ConnectionError, ResponseError, Result};
pub use flags::MessageFlags;
pub use handler::{
    BoxFuture, HandlerError, NotificationHandler, RequestHandler, GENERIC_ERROR_CODE,
};
pub use listener::ConnectionListener;
