//! Echo server: accepts one client and answers its requests with their params.
//!
//! Run with:
//!   cargo run -p ipcwire --example echo-server
//!
//! In another terminal:
//!   cargo run -p ipcwire --features cli -- call /tmp/ipcwire-echo-<pid>/echo.sock \
//!     hello --json '{"hello":"world"}'

use std::fs;

use ipcwire::connection::{Connection, ConnectionListener, HandlerError};
use ipcwire::Value;

async fn echo(
    conn: Connection,
    id: u32,
    name: String,
    params: Value,
) -> Result<Value, HandlerError> {
    eprintln!("{conn}: request #{id} {name} ({})", params.kind());
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("ipcwire-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = ConnectionListener::bind(&sock_path)?.with_request_handler(echo);
    eprintln!("Listening on {}", sock_path.display());

    let (conn, session) = listener.accept().await?;
    eprintln!("{conn} connected");

    match session.await? {
        Ok(()) => eprintln!("{conn} disconnected"),
        Err(e) => eprintln!("{conn} failed: {e}"),
    }

    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
