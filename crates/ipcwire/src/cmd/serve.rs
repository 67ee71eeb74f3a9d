use ipcwire_codec::Value;
use ipcwire_connection::{Connection, ConnectionListener, HandlerError};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::convert::value_to_json;
use crate::exit::{connection_error, CliResult, SUCCESS};

/// Error code sent back for the `fail` request.
pub const FAIL_CODE: i64 = 42;

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let listener = ConnectionListener::bind(&args.path)
        .map_err(|err| connection_error("bind failed", err))?
        .with_request_handler(echo)
        .with_notification_handler(log_notification);
    info!(path = %args.path.display(), "listening");

    let mut open: Vec<Connection> = Vec::new();
    let mut sessions = JoinSet::new();
    let mut served = 0usize;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    while args.count.map_or(true, |count| served < count) {
        tokio::select! {
            result = &mut interrupted => {
                if let Err(err) = result {
                    warn!(error = %err, "signal handler failed");
                }
                info!("interrupted, closing connections");
                for conn in &open {
                    conn.close();
                }
                break;
            }
            accepted = listener.accept() => {
                let (conn, session) =
                    accepted.map_err(|err| connection_error("accept failed", err))?;
                served += 1;
                let num = conn.num();
                info!(conn = num, "client connected");
                open.push(conn);
                sessions.spawn(async move {
                    match session.await {
                        Ok(Ok(())) => info!(conn = num, "client disconnected"),
                        Ok(Err(err)) => warn!(conn = num, error = %err, "session failed"),
                        Err(err) => warn!(conn = num, error = %err, "session task failed"),
                    }
                    num
                });
            }
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Ok(num) = finished {
                    open.retain(|conn| conn.num() != num);
                }
            }
        }
    }

    while sessions.join_next().await.is_some() {}
    Ok(SUCCESS)
}

async fn echo(
    _conn: Connection,
    id: u32,
    name: String,
    params: Value,
) -> Result<Value, HandlerError> {
    info!(id, %name, "request");
    match name.as_str() {
        "ping" => Ok(Value::from("pong")),
        "fail" => Err(HandlerError::new(FAIL_CODE, "requested failure")),
        _ => Ok(params),
    }
}

async fn log_notification(
    conn: Connection,
    id: u32,
    name: String,
    params: Value,
) -> Result<(), HandlerError> {
    info!(conn = conn.num(), id, %name, params = %value_to_json(&params), "notification");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> Connection {
        Connection::builder(0).build()
    }

    #[tokio::test]
    async fn echo_replies() {
        let pong = echo(detached(), 1, "ping".into(), Value::Null).await.unwrap();
        assert_eq!(pong, Value::from("pong"));

        let params = Value::dict([("n", 1)]);
        let echoed = echo(detached(), 2, "anything".into(), params).await.unwrap();
        assert_eq!(echoed, Value::dict([("n", 1)]));

        let err = echo(detached(), 3, "fail".into(), Value::Null).await.unwrap_err();
        assert_eq!(err.code, FAIL_CODE);
    }
}
