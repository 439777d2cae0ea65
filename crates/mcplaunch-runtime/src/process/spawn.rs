//! Backend process spawning.

use std::io;
use std::process::{ExitStatus, Stdio};

use mcplaunch_core::{BackendEndpoint, CommandSpec, LaunchError};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::logs::SessionLog;

/// Ownership of the running backend process.
#[derive(Debug)]
pub struct BackendHandle {
    child: Child,
    pid: u32,
    /// Whether the backend leads its own process group.
    isolated: bool,
}

impl BackendHandle {
    /// OS process ID of the backend (the group leader when isolated).
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the backend was placed in a process group of its own.
    pub const fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Non-blocking check for exit; reaps the process if it has exited.
    pub fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    pub(crate) const fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

/// Start the backend bound to `endpoint`, with output going to `log`.
///
/// The backend runs as `<program> <args..> --host <host> --port <port>` with
/// stdin closed. On Unix it is placed in a new process group so terminal
/// signals aimed at the launcher's group never reach it directly and teardown
/// can target the whole group. If the platform refuses to create the group,
/// the backend is started in the launcher's group instead and teardown will
/// signal it by PID.
pub fn spawn_backend(
    spec: &CommandSpec,
    endpoint: &BackendEndpoint,
    log: &SessionLog,
) -> Result<BackendHandle, LaunchError> {
    let to_error = |source| LaunchError::BackendSpawn {
        program: spec.program.clone(),
        source,
    };

    match spawn_with(spec, endpoint, log, cfg!(unix)) {
        Ok(handle) => Ok(handle),
        Err(e) if cfg!(unix) && e.kind() != io::ErrorKind::NotFound => {
            warn!(
                program = %spec.program,
                error = %e,
                "Could not start backend in its own process group; retrying in the launcher's group"
            );
            spawn_with(spec, endpoint, log, false).map_err(to_error)
        }
        Err(e) => Err(to_error(e)),
    }
}

fn spawn_with(
    spec: &CommandSpec,
    endpoint: &BackendEndpoint,
    log: &SessionLog,
    isolate: bool,
) -> io::Result<BackendHandle> {
    let (stdout, stderr) = log.stdio()?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .arg("--host")
        .arg(&endpoint.host)
        .arg("--port")
        .arg(endpoint.port.to_string())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    #[cfg(unix)]
    if isolate {
        cmd.process_group(0);
    }

    debug!(command = ?cmd.as_std(), isolate, "Spawning backend");
    let child = cmd.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| io::Error::other("backend exited before its PID could be read"))?;

    Ok(BackendHandle {
        child,
        pid,
        isolated: isolate,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn endpoint() -> BackendEndpoint {
        BackendEndpoint::new("127.0.0.1", 45678)
    }

    #[tokio::test]
    async fn backend_receives_host_and_port() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::create_for_pid(temp.path(), 1).unwrap();
        // `sh -c script` binds trailing args to $0, $1, ...
        let spec = CommandSpec::new("sh", ["-c", "echo \"args: $0 $1 $2 $3\""]);

        let mut backend = spawn_backend(&spec, &endpoint(), &log).unwrap();
        let status = backend.child_mut().wait().await.unwrap();
        assert!(status.success());

        let output = log.read_tail().unwrap();
        assert_eq!(output, "args: --host 127.0.0.1 --port 45678");
    }

    #[tokio::test]
    async fn backend_leads_its_own_process_group() {
        use nix::unistd::{Pid, getpgid, getpgrp};

        let temp = TempDir::new().unwrap();
        let log = SessionLog::create_for_pid(temp.path(), 2).unwrap();
        let spec = CommandSpec::new("sh", ["-c", "exec sleep 5"]);

        let mut backend = spawn_backend(&spec, &endpoint(), &log).unwrap();
        assert!(backend.is_isolated());

        let pid = Pid::from_raw(backend.pid() as i32);
        let pgid = getpgid(Some(pid)).unwrap();
        assert_eq!(pgid, pid);
        assert_ne!(pgid, getpgrp());

        backend.child_mut().kill().await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::create_for_pid(temp.path(), 3).unwrap();
        let spec = CommandSpec::new("/nonexistent/mcplaunch-backend", Vec::<String>::new());

        let err = spawn_backend(&spec, &endpoint(), &log).unwrap_err();
        assert!(matches!(err, LaunchError::BackendSpawn { .. }));
    }
}
