use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use ipcwire_codec::Value;

use crate::convert::json_to_value;
use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod notify;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an echo server on a socket path.
    Serve(ServeArgs),
    /// Send one request and print the response.
    Call(CallArgs),
    /// Send one notification.
    Notify(NotifyArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    if let Command::Version(args) = command {
        return version::run(args);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    runtime.block_on(async move {
        match command {
            Command::Serve(args) => serve::run(args).await,
            Command::Call(args) => call::run(args, format).await,
            Command::Notify(args) => notify::run(args).await,
            Command::Version(args) => version::run(args),
        }
    })
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after serving N connections.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Request name.
    pub name: String,
    /// JSON params (default: null).
    #[arg(long)]
    pub json: Option<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Notification name.
    pub name: String,
    /// JSON params (default: null).
    #[arg(long)]
    pub json: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_params(json: Option<&str>) -> CliResult<Value> {
    let Some(json) = json else {
        return Ok(Value::Null);
    };
    serde_json::from_str::<serde_json::Value>(json)
        .map(json_to_value)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
