use std::fmt;
use std::io;

use ipcwire_codec::CodecError;
use ipcwire_connection::ConnectionError;
use ipcwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { ref source, .. } | TransportError::Connect { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Accept(source) | TransportError::Io(source) => io_error(context, source),
        TransportError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn connection_error(context: &str, err: ConnectionError) -> CliError {
    match err {
        ConnectionError::Transport(err) => transport_error(context, err),
        ConnectionError::Codec(err) => codec_error(context, err),
        ConnectionError::Io(err) => io_error(context, err),
        ConnectionError::Response(_) | ConnectionError::Handler(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ConnectionError::Closed | ConnectionError::Protocol(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ipcwire_connection::ResponseError;

    use super::*;

    #[test]
    fn missing_socket_is_a_transport_failure() {
        let err = TransportError::Connect {
            path: PathBuf::from("/nonexistent/x.sock"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let cli = connection_error("connect failed", ConnectionError::Transport(err));
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("connect failed: "));
    }

    #[test]
    fn permission_denied_keeps_its_code() {
        let err = TransportError::Bind {
            path: PathBuf::from("/root/x.sock"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("bind failed", err).code, PERMISSION_DENIED);
    }

    #[test]
    fn remote_errors_exit_with_failure() {
        let err = ConnectionError::Response(ResponseError {
            code: 7,
            message: "nope".to_string(),
        });
        let cli = connection_error("call failed", err);
        assert_eq!(cli.code, FAILURE);
        assert_eq!(cli.message, "call failed: remote error 7: nope");
    }

    #[test]
    fn codec_and_misuse_errors() {
        let cli = connection_error(
            "call failed",
            ConnectionError::Codec(CodecError::Encoder("bad".to_string())),
        );
        assert_eq!(cli.code, DATA_INVALID);
        assert_eq!(connection_error("x", ConnectionError::NotAttached).code, INTERNAL);
        assert_eq!(connection_error("x", ConnectionError::Closed).code, TRANSPORT_ERROR);
    }
}
