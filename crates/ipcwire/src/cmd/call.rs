use std::time::Instant;

use ipcwire_connection::Connection;
use tracing::debug;

use crate::cmd::{parse_duration, parse_params, CallArgs};
use crate::exit::{connection_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_call_result, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(args.json.as_deref())?;

    let conn = Connection::builder(1).build();
    let session = conn
        .spawn_connect(&args.path)
        .await
        .map_err(|err| connection_error("connect failed", err))?;

    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, conn.call(&args.name, params)).await;
    conn.close();
    if let Ok(Err(err)) = session.await {
        debug!(error = %err, "session ended with error");
    }

    let result = match outcome {
        Ok(result) => result.map_err(|err| connection_error("call failed", err))?,
        Err(_) => {
            return Err(CliError::new(
                TIMEOUT,
                format!("call timed out after {timeout:?}"),
            ))
        }
    };

    print_call_result(
        &args.path.display().to_string(),
        &args.name,
        started.elapsed(),
        &result,
        format,
    );
    Ok(SUCCESS)
}
