//! Black-box tests of the `mcplaunch` binary with stub backend and proxy.

#![cfg(unix)]

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tempfile::TempDir;

/// Launcher command with a `sh -c <backend>` backend and an `sh` proxy.
///
/// Proxy scripts go in as caller args after `--`: `sh -c <script>` sees the
/// appended `--databricks-app-url <url>` as `$0 $1`.
fn launcher(log_dir: &Path, backend: &str, proxy: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mcplaunch"));
    cmd.env_remove("RUST_LOG")
        .arg("--log-dir")
        .arg(log_dir)
        .args(["--backend-program", "sh", "--backend-arg=-c", "--backend-arg"])
        .arg(backend)
        .args(["--readiness", "delay", "--startup-delay-ms", "200"])
        .args(["--term-timeout-ms", "500", "--kill-timeout-ms", "2000"])
        .args(["--proxy-program", "sh", "--", "-c"])
        .arg(proxy);
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.stdin(Stdio::null()).output().unwrap()
}

fn wait_for_file(path: &Path) -> String {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(text) = std::fs::read_to_string(path) {
            if text.ends_with('\n') {
                return text.trim().to_string();
            }
        }
        sleep(Duration::from_millis(20));
    }
    panic!("{} never written", path.display());
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        sleep(Duration::from_millis(20));
    }
    None
}

fn pid_gone(pid: i32) -> bool {
    matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

#[test]
fn test_proxy_exit_code_becomes_launcher_exit_code() {
    let temp = TempDir::new().unwrap();
    let output = run(&mut launcher(temp.path(), "exec sleep 30", "exit 3"));
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_clean_run_exits_zero_and_reports_shutdown() {
    let temp = TempDir::new().unwrap();
    let output = run(&mut launcher(temp.path(), "exec sleep 30", "sleep 0.5"));

    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Shutdown complete. Final exit code: 0"),
        "{stderr}"
    );
}

#[test]
fn test_backend_failure_exits_one_and_names_code() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("proxy-ran");
    let proxy = format!("touch {}", marker.display());

    let output = run(&mut launcher(temp.path(), "exit 7", &proxy));

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Exit code: 7"), "{stderr}");
    assert!(!marker.exists());
}

#[test]
fn test_proxy_owns_stdout_and_stdin() {
    let temp = TempDir::new().unwrap();
    let mut child = launcher(temp.path(), "echo backend-noise; exec sleep 30", "cat")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"{\"jsonrpc\":\"2.0\"}\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    // Only the proxy wrote to stdout; backend output went to the log
    assert_eq!(output.stdout, b"{\"jsonrpc\":\"2.0\"}\n");
    let log = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .find(|e| e.file_name().to_string_lossy().starts_with("mcplaunch-backend-"))
        .unwrap();
    assert!(
        std::fs::read_to_string(log.path())
            .unwrap()
            .contains("backend-noise")
    );
}

#[test]
fn test_sigint_tears_down_backend_and_exits_130() {
    let temp = TempDir::new().unwrap();
    let backend_pid = temp.path().join("backend.pid");
    let proxy_pid = temp.path().join("proxy.pid");
    // The backend ignores SIGTERM, so teardown must escalate
    let backend = format!(
        "trap '' TERM; echo $$ > {}; exec sleep 30",
        backend_pid.display()
    );
    let proxy = format!("echo $$ > {}; exec sleep 30", proxy_pid.display());

    let mut child = launcher(temp.path(), &backend, &proxy)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let backend: i32 = wait_for_file(&backend_pid).parse().unwrap();
    let proxy: i32 = wait_for_file(&proxy_pid).parse().unwrap();

    let sent = Instant::now();
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();
    let status = wait_with_timeout(&mut child, Duration::from_secs(5));

    // The proxy is left to its caller; clean it up ourselves
    let _ = kill(Pid::from_raw(proxy), Signal::SIGKILL);

    let status = status.expect("launcher did not exit after SIGINT");
    assert_eq!(status.code(), Some(130));
    assert!(sent.elapsed() < Duration::from_secs(4));
    assert!(pid_gone(backend), "backend {backend} still alive");
}

#[test]
fn test_concurrent_launchers_get_distinct_ports_and_logs() {
    let temp = TempDir::new().unwrap();
    let spawn = |name: &str| {
        let out = temp.path().join(name);
        let proxy = format!("echo \"$DATABRICKS_APP_URL\" > {}", out.display());
        let child = launcher(temp.path(), "exec sleep 30", &proxy)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        (child, out)
    };

    let (mut a, a_out) = spawn("a.url");
    let (mut b, b_out) = spawn("b.url");
    assert!(a.wait().unwrap().success());
    assert!(b.wait().unwrap().success());

    let (a_url, b_url) = (wait_for_file(&a_out), wait_for_file(&b_out));
    assert!(a_url.starts_with("http://127.0.0.1:"), "{a_url}");
    assert_ne!(a_url, b_url);

    let logs = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("mcplaunch-backend-"))
        .count();
    assert_eq!(logs, 2);
}

#[test]
fn test_unknown_option_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_mcplaunch"))
        .args(["--readiness", "sometimes", "--"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_launcher_flags_after_proxy_script_reach_proxy() {
    let temp = TempDir::new().unwrap();
    let seen = temp.path().join("seen");
    let proxy = format!("echo \"$0 $@\" > {}", seen.display());

    let output = run(launcher(temp.path(), "exec sleep 30", &proxy).args([
        "--verbose",
        "--host",
        "x",
        "--help",
    ]));

    assert_eq!(output.status.code(), Some(0));
    let seen = wait_for_file(&seen);
    assert!(
        seen.starts_with("--verbose --host x --help --databricks-app-url http://127.0.0.1:"),
        "{seen}"
    );
}

#[test]
fn test_without_separator_all_args_go_to_proxy() {
    let temp = TempDir::new().unwrap();
    let seen = temp.path().join("seen");
    let proxy = format!("echo \"$0 $@\" > {}", seen.display());

    let config = temp.path().join("launch.json");
    let settings = serde_json::json!({
        "backend": { "program": "sh", "args": ["-c", "exec sleep 30", "backend"] },
        "proxy": { "program": "sh", "args": ["-c", proxy] },
        "readiness": { "kind": "delay" },
        "startup_delay_ms": 200,
        "log_dir": temp.path(),
    });
    std::fs::write(&config, settings.to_string()).unwrap();

    // Launcher settings come from the environment when no `--` is given
    let output = Command::new(env!("CARGO_BIN_EXE_mcplaunch"))
        .env_remove("RUST_LOG")
        .env("MCPLAUNCH_CONFIG", &config)
        .arg("--verbose")
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let seen = wait_for_file(&seen);
    assert!(
        seen.starts_with("--verbose --databricks-app-url http://127.0.0.1:"),
        "{seen}"
    );
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_mcplaunch"))
        .env_remove("RUST_LOG")
        .arg("--log-dir")
        .arg(temp.path())
        .args(["--endpoint-env", "BAD=NAME", "--"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(78));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("endpoint environment variable"), "{stderr}");
}
