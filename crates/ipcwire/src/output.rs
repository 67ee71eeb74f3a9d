use std::io::IsTerminal;

use clap::ValueEnum;
use ipcwire_codec::Value;
use serde::Serialize;

use crate::convert::value_to_json;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    path: &'a str,
    name: &'a str,
    elapsed_ms: u128,
    result: serde_json::Value,
}

pub fn print_call_result(
    path: &str,
    name: &str,
    elapsed: std::time::Duration,
    result: &Value,
    format: OutputFormat,
) {
    println!("{}", render_call_result(path, name, elapsed, result, format));
}

fn render_call_result(
    path: &str,
    name: &str,
    elapsed: std::time::Duration,
    result: &Value,
    format: OutputFormat,
) -> String {
    let result = value_to_json(result);
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                path,
                name,
                elapsed_ms: elapsed.as_millis(),
                result,
            };
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Pretty => match result {
            serde_json::Value::String(s) => s,
            other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn json_output_wraps_result() {
        let line = render_call_result(
            "/tmp/a.sock",
            "ping",
            Duration::from_millis(3),
            &Value::from("pong"),
            OutputFormat::Json,
        );
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["name"], "ping");
        assert_eq!(parsed["result"], "pong");
        assert_eq!(parsed["elapsed_ms"], 3);
    }

    #[test]
    fn pretty_output_prints_strings_bare() {
        let line = render_call_result(
            "/tmp/a.sock",
            "ping",
            Duration::ZERO,
            &Value::from("pong"),
            OutputFormat::Pretty,
        );
        assert_eq!(line, "pong");
    }
}
