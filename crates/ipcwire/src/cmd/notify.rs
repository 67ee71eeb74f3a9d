use ipcwire_connection::Connection;
use tracing::debug;

use crate::cmd::{parse_params, NotifyArgs};
use crate::exit::{connection_error, CliResult, SUCCESS};

pub async fn run(args: NotifyArgs) -> CliResult<i32> {
    let params = parse_params(args.json.as_deref())?;

    let conn = Connection::builder(1).build();
    let session = conn
        .spawn_connect(&args.path)
        .await
        .map_err(|err| connection_error("connect failed", err))?;

    let sent = match conn.notify(&args.name, params) {
        Ok(()) => conn.flush().await,
        Err(err) => Err(err),
    };
    conn.close();
    if let Ok(Err(err)) = session.await {
        debug!(error = %err, "session ended with error");
    }

    sent.map_err(|err| connection_error("notify failed", err))?;
    debug!(name = %args.name, "notification sent");
    Ok(SUCCESS)
}
