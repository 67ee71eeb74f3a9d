#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ipcwire::transport::SeqPacketSocket;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/ipcwire-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_connect(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if SeqPacketSocket::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn ipcwire(args: &[&str], path: &Path) -> Output {
    let (before, after) = args.split_at(1);
    Command::new(env!("CARGO_BIN_EXE_ipcwire"))
        .args(["--log-level", "error"])
        .args(before)
        .arg(path)
        .args(after)
        .output()
        .expect("ipcwire should run")
}

struct Server {
    child: Child,
    dir: PathBuf,
    path: PathBuf,
}

impl Server {
    fn start(tag: &str) -> Self {
        let dir = unique_temp_dir(tag);
        let path = dir.join("echo.sock");
        let child = Command::new(env!("CARGO_BIN_EXE_ipcwire"))
            .args(["--log-level", "error", "serve"])
            .arg(&path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");
        wait_for_connect(&path, Duration::from_secs(3));
        Self { child, dir, path }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn call_ping_prints_pong() {
    let server = Server::start("ping");

    let output = ipcwire(&["call", "ping", "--format", "pretty"], &server.path);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "pong");
}

#[test]
fn call_echoes_json_params() {
    let server = Server::start("echo");

    let output = ipcwire(
        &["call", "echo", "--format", "json", "--json", r#"{"b": [1, 2.5], "a": "x"}"#],
        &server.path,
    );
    assert!(output.status.success(), "{output:?}");
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be json");
    assert_eq!(parsed["name"], "echo");
    assert_eq!(parsed["result"], serde_json::json!({"b": [1, 2.5], "a": "x"}));
}

#[test]
fn remote_error_exits_with_failure() {
    let server = Server::start("fail");

    let output = ipcwire(&["call", "fail"], &server.path);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("requested failure"), "{stderr}");
}

#[test]
fn notify_succeeds() {
    let server = Server::start("notify");

    let output = ipcwire(&["notify", "tick", "--json", "[1, 2, 3]"], &server.path);
    assert!(output.status.success(), "{output:?}");
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_socket_is_a_transport_error() {
    let dir = unique_temp_dir("missing");
    let path = dir.join("absent.sock");

    let output = ipcwire(&["call", "ping"], &path);
    assert_eq!(output.status.code(), Some(3));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_json_is_a_usage_error() {
    let dir = unique_temp_dir("badjson");
    let path = dir.join("unused.sock");

    let output = ipcwire(&["notify", "tick", "--json", "{nope"], &path);
    assert_eq!(output.status.code(), Some(64));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipcwire"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("ipcwire {}", env!("CARGO_PKG_VERSION"))));
    assert!(stdout.contains("features: connection=true"));
}
