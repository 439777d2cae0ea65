//! Exit status helpers.

use std::process::ExitStatus;

use mcplaunch_core::{EXIT_FAILURE, SIGNAL_EXIT_BASE};

/// Shell-style exit code for `status`: the code itself, or `128 + signo`
/// when the process was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            return SIGNAL_EXIT_BASE + signo;
        }
    }

    EXIT_FAILURE
}

/// Human-readable form used in diagnostics: `7` or `signal 9`.
pub fn describe(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return code.to_string();
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            return format!("signal {signo}");
        }
    }

    "unknown".to_string()
}
