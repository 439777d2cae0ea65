//! Mapping of session outcomes to process exit codes.

use std::fmt;

/// Exit code for startup failures and unexpected internal errors.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when the proxy executable does not exist (shell convention).
pub const EXIT_PROXY_NOT_FOUND: i32 = 127;
/// Exit code when the proxy exists but could not be started.
pub const EXIT_PROXY_SPAWN_FAILED: i32 = 126;
/// Signal-terminated processes exit with `SIGNAL_EXIT_BASE + signo`.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The proxy ran; its exit code is passed through.
    Proxy(i32),
    /// The backend never became usable.
    StartupFailed,
    /// An unexpected orchestration error.
    Internal,
    /// The launcher received a termination signal.
    Signaled(i32),
}

impl ExitOutcome {
    /// Process exit code for this outcome.
    pub const fn code(self) -> i32 {
        match self {
            Self::Proxy(code) => code,
            Self::StartupFailed | Self::Internal => EXIT_FAILURE,
            Self::Signaled(signo) => SIGNAL_EXIT_BASE + signo,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxy(code) => write!(f, "proxy exited with code {code}"),
            Self::StartupFailed => write!(f, "backend startup failed"),
            Self::Internal => write!(f, "internal error"),
            Self::Signaled(signo) => write!(f, "terminated by signal {signo}"),
        }
    }
}
