//! Backend teardown with SIGTERM → SIGKILL escalation, scoped to the
//! backend's process group.

use std::fmt;

use mcplaunch_core::ShutdownTimeouts;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::{Pid, getpgid, getpgrp};
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::time::{Instant, sleep};

use super::spawn::BackendHandle;

/// How the backend went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// It had already exited before teardown started.
    AlreadyExited,
    /// It exited within the grace period after SIGTERM.
    Terminated,
    /// It needed SIGKILL.
    Killed,
    /// It was still not reaped after SIGKILL.
    Unresponsive,
}

/// What teardown signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScope {
    /// Nothing was signaled.
    None,
    /// The backend's whole process group.
    Group,
    /// Only the backend PID (process group unavailable).
    Process,
}

/// Result of tearing the backend down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTeardown {
    pub pid: u32,
    pub outcome: TeardownOutcome,
    pub scope: SignalScope,
}

impl fmt::Display for BackendTeardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.outcome {
            TeardownOutcome::AlreadyExited => "had already exited",
            TeardownOutcome::Terminated => "terminated gracefully",
            TeardownOutcome::Killed => "killed",
            TeardownOutcome::Unresponsive => "did not exit after SIGKILL",
        };
        write!(f, "backend {} {what}", self.pid)
    }
}

/// Stop the backend and reap it.
///
/// # Strategy
/// 1. If it has already exited, just reap it, unless members of its process
///    group are still alive, in which case the group goes through steps 2-3
/// 2. Send SIGTERM to its process group and wait up to `timeouts.term`
/// 3. If anything in the group is still alive, send SIGKILL and wait up to
///    `timeouts.kill`
///
/// "No such process" at any step counts as success. Failures are logged and
/// never returned; teardown always runs to completion.
pub async fn terminate_backend(
    backend: &mut BackendHandle,
    timeouts: ShutdownTimeouts,
) -> BackendTeardown {
    let pid = backend.pid();
    let mut report = BackendTeardown {
        pid,
        outcome: TeardownOutcome::AlreadyExited,
        scope: SignalScope::None,
    };

    match backend.try_exit_status() {
        Ok(Some(status)) => {
            debug!(pid = %pid, status = %status, "Backend already exited");
            #[cfg(unix)]
            {
                if let Some(group) = surviving_group(backend) {
                    warn!(pid = %pid, "Backend exited but its process group is still alive");
                    terminate_unix(backend, group, timeouts, &mut report).await;
                    info!(pid = %pid, outcome = ?report.outcome, scope = ?report.scope, "Backend teardown finished");
                }
            }
            return report;
        }
        Ok(None) => {}
        Err(e) => warn!(pid = %pid, error = %e, "Could not query backend status"),
    }

    #[cfg(unix)]
    {
        let target = resolve_target(backend);
        terminate_unix(backend, target, timeouts, &mut report).await;
    }

    #[cfg(not(unix))]
    {
        terminate_other(backend, timeouts, &mut report).await;
    }

    info!(pid = %pid, outcome = ?report.outcome, scope = ?report.scope, "Backend teardown finished");
    report
}

/// Where signals go.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
enum Target {
    Group(Pid),
    Process(Pid),
}

#[cfg(unix)]
impl Target {
    fn send(self, sig: Signal) -> nix::Result<()> {
        match self {
            Self::Group(pgid) => signal::killpg(pgid, sig),
            Self::Process(pid) => signal::kill(pid, sig),
        }
    }

    /// Whether anything addressed by this target is still around.
    fn is_alive(self) -> bool {
        let probe = match self {
            Self::Group(pgid) => signal::killpg(pgid, None),
            Self::Process(pid) => signal::kill(pid, None),
        };
        // EPERM means it exists but belongs to someone else
        !matches!(probe, Err(Errno::ESRCH))
    }

    const fn scope(self) -> SignalScope {
        match self {
            Self::Group(_) => SignalScope::Group,
            Self::Process(_) => SignalScope::Process,
        }
    }
}

/// Resolve the backend's process group, falling back to its PID when the
/// group is unknown or is the launcher's own.
#[cfg(unix)]
fn resolve_target(backend: &BackendHandle) -> Target {
    let pid = Pid::from_raw(backend.pid() as i32);

    if !backend.is_isolated() {
        warn!(pid = %pid, "Backend shares the launcher's process group; signaling it directly");
        return Target::Process(pid);
    }

    match getpgid(Some(pid)) {
        Ok(pgid) if pgid == getpgrp() => {
            warn!(pid = %pid, "Backend process group is the launcher's own; signaling it directly");
            Target::Process(pid)
        }
        Ok(pgid) => Target::Group(pgid),
        Err(e) => {
            warn!(pid = %pid, error = %e, "Could not resolve backend process group; signaling it directly");
            Target::Process(pid)
        }
    }
}

/// The backend's own process group, if the backend was isolated and some
/// member of the group outlived it.
///
/// The leader was spawned with `process_group(0)`, so its PID is the group ID
/// even after it has been reaped.
#[cfg(unix)]
fn surviving_group(backend: &BackendHandle) -> Option<Target> {
    if !backend.is_isolated() {
        return None;
    }
    let group = Target::Group(Pid::from_raw(backend.pid() as i32));
    group.is_alive().then_some(group)
}

#[cfg(unix)]
async fn terminate_unix(
    backend: &mut BackendHandle,
    target: Target,
    timeouts: ShutdownTimeouts,
    report: &mut BackendTeardown,
) {
    report.scope = target.scope();

    // Phase 1: SIGTERM with grace period
    debug!(target = ?target, "Sending SIGTERM to backend");
    match target.send(Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            debug!(target = ?target, "Backend vanished before SIGTERM");
            reap(backend, timeouts.kill).await;
            report.outcome = TeardownOutcome::AlreadyExited;
            return;
        }
        Err(e) => warn!(target = ?target, error = %e, "Failed to send SIGTERM"),
    }

    let started = Instant::now();
    if timeout(timeouts.term, backend.child_mut().wait()).await.is_ok() {
        // The leader is gone; give the rest of its group what is left of the
        // grace period before escalating
        let remaining = timeouts.term.saturating_sub(started.elapsed());
        if wait_until_gone(target, remaining).await {
            report.outcome = TeardownOutcome::Terminated;
            return;
        }
        warn!(target = ?target, "Backend workers outlived the group leader");
    } else {
        warn!(
            target = ?target,
            timeout = ?timeouts.term,
            "Backend did not exit after SIGTERM; sending SIGKILL"
        );
    }

    // Phase 2: SIGKILL
    match target.send(Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(target = ?target, error = %e, "Failed to send SIGKILL"),
    }

    // Phase 3: reap (required to avoid zombies)
    report.outcome = if reap(backend, timeouts.kill).await {
        TeardownOutcome::Killed
    } else {
        warn!(target = ?target, timeout = ?timeouts.kill, "Backend still running after SIGKILL");
        TeardownOutcome::Unresponsive
    };
}

/// Poll until nothing addressed by `target` is alive, for at most `budget`.
#[cfg(unix)]
async fn wait_until_gone(target: Target, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if !target.is_alive() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

/// Wait for the backend to be reaped. Returns `false` on timeout.
#[cfg(unix)]
async fn reap(backend: &mut BackendHandle, limit: Duration) -> bool {
    match timeout(limit, backend.child_mut().wait()).await {
        Ok(Ok(status)) => {
            debug!(status = %status, "Backend reaped");
            true
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to reap backend");
            true
        }
        Err(_) => false,
    }
}

#[cfg(not(unix))]
async fn terminate_other(
    backend: &mut BackendHandle,
    timeouts: ShutdownTimeouts,
    report: &mut BackendTeardown,
) {
    // No SIGTERM equivalent: terminate immediately
    report.scope = SignalScope::Process;
    if let Err(e) = backend.child_mut().start_kill() {
        warn!(error = %e, "Failed to kill backend");
    }
    report.outcome = match timeout(timeouts.kill, backend.child_mut().wait()).await {
        Ok(_) => TeardownOutcome::Killed,
        Err(_) => TeardownOutcome::Unresponsive,
    };
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logs::SessionLog;
    use crate::process::spawn_backend;
    use mcplaunch_core::{BackendEndpoint, CommandSpec};
    use std::time::Duration;
    use tempfile::TempDir;

    fn timeouts() -> ShutdownTimeouts {
        ShutdownTimeouts {
            term: Duration::from_millis(500),
            kill: Duration::from_secs(2),
        }
    }

    fn spawn(temp: &TempDir, script: &str) -> BackendHandle {
        let log = SessionLog::create_for_pid(temp.path(), 1).unwrap();
        let endpoint = BackendEndpoint::new("127.0.0.1", 1);
        spawn_backend(&CommandSpec::new("sh", ["-c", script]), &endpoint, &log).unwrap()
    }

    fn pid_exists(pid: i32) -> bool {
        !matches!(signal::kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
    }

    #[tokio::test]
    async fn sigterm_stops_cooperative_backend() {
        let temp = TempDir::new().unwrap();
        let mut backend = spawn(&temp, "exec sleep 30");

        let report = terminate_backend(&mut backend, timeouts()).await;
        assert_eq!(report.outcome, TeardownOutcome::Terminated);
        assert_eq!(report.scope, SignalScope::Group);
        assert!(!pid_exists(backend.pid() as i32));
    }

    #[tokio::test]
    async fn sigkill_follows_ignored_sigterm() {
        let temp = TempDir::new().unwrap();
        // SIG_IGN survives exec, so sleep ignores SIGTERM too
        let mut backend = spawn(&temp, "trap '' TERM; exec sleep 30");
        // Let the shell install the trap before we signal it
        sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        let report = terminate_backend(&mut backend, timeouts()).await;
        assert_eq!(report.outcome, TeardownOutcome::Killed);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!pid_exists(backend.pid() as i32));
    }

    /// Running and not a zombie awaiting a reaper.
    #[cfg(target_os = "linux")]
    fn pid_running(pid: i32) -> bool {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return false;
        };
        // State follows the parenthesized command name
        stat.rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z'))
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn whole_group_is_torn_down() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("worker.pid");
        // The leader forks a worker that ignores SIGTERM and records its PID
        let script = format!(
            "(trap '' TERM; exec sleep 30) & echo $! > {}; wait",
            pid_file.display()
        );
        let mut backend = spawn(&temp, &script);

        let mut worker = None;
        for _ in 0..50 {
            if let Ok(text) = std::fs::read_to_string(&pid_file) {
                if let Ok(pid) = text.trim().parse::<i32>() {
                    worker = Some(pid);
                    break;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
        let worker = worker.expect("worker pid recorded");

        let report = terminate_backend(&mut backend, timeouts()).await;
        assert_eq!(report.outcome, TeardownOutcome::Killed);

        let mut gone = false;
        for _ in 0..40 {
            if !pid_running(worker) {
                gone = true;
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "worker {worker} survived group teardown");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn group_outliving_exited_leader_is_torn_down() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("worker.pid");
        // The leader crashes right after forking a worker that ignores SIGTERM
        let script = format!(
            "(trap '' TERM; exec sleep 30) & echo $! > {}; exit 7",
            pid_file.display()
        );
        let mut backend = spawn(&temp, &script);

        let mut exited = None;
        for _ in 0..100 {
            if let Some(status) = backend.try_exit_status().unwrap() {
                exited = Some(status);
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(exited.and_then(|s| s.code()), Some(7));
        let worker: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(pid_running(worker));
        // Let the worker install its trap before we signal it
        sleep(Duration::from_millis(200)).await;

        let report = terminate_backend(&mut backend, timeouts()).await;
        assert_eq!(report.outcome, TeardownOutcome::Killed);
        assert_eq!(report.scope, SignalScope::Group);

        let mut gone = false;
        for _ in 0..40 {
            if !pid_running(worker) {
                gone = true;
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "worker {worker} outlived its exited leader");
    }

    #[tokio::test]
    async fn exited_backend_is_not_signaled() {
        let temp = TempDir::new().unwrap();
        let mut backend = spawn(&temp, "exit 0");
        sleep(Duration::from_millis(200)).await;

        let report = terminate_backend(&mut backend, timeouts()).await;
        assert_eq!(report.outcome, TeardownOutcome::AlreadyExited);
        assert_eq!(report.scope, SignalScope::None);
    }
}
