//! Error taxonomy for launch sessions.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::SessionState;

/// Errors that end a session before or during startup.
///
/// Proxy failures are deliberately absent: a proxy that exits non-zero or
/// cannot be spawned is a completed session with that exit code, not an error.
/// Teardown problems are logged, never raised.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No free loopback port could be obtained.
    #[error("No free port available on {host}: {source}")]
    PortAllocation {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The per-run log file could not be created or read.
    #[error("Session log error at {}: {source}", path.display())]
    LogSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backend process could not be spawned at all.
    #[error("Failed to spawn backend `{program}`: {source}")]
    BackendSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The backend exited before it became ready.
    #[error("Backend failed to start. Exit code: {code}. Output:\n{output}")]
    BackendExited {
        /// Exit code, or a `signal N` description if it was killed.
        code: String,
        /// Captured backend output (tail of the session log).
        output: String,
    },

    /// The backend stayed alive but never accepted connections.
    #[error("Backend did not become ready on {endpoint} within {timeout_ms}ms")]
    BackendNotReady { endpoint: String, timeout_ms: u128 },

    /// An illegal lifecycle transition was requested.
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other unexpected failure during orchestration.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LaunchError {
    /// Whether the error stems from backend startup rather than a bug or bad input.
    pub const fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::PortAllocation { .. }
                | Self::LogSink { .. }
                | Self::BackendSpawn { .. }
                | Self::BackendExited { .. }
                | Self::BackendNotReady { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_exit_message_carries_code_and_output() {
        let err = LaunchError::BackendExited {
            code: "7".into(),
            output: "address already in use".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Exit code: 7"));
        assert!(msg.contains("address already in use"));
        assert!(err.is_startup_failure());
    }

    #[test]
    fn transition_errors_are_not_startup_failures() {
        let err = LaunchError::InvalidTransition {
            from: SessionState::Init,
            to: SessionState::ProxyRunning,
        };
        assert!(!err.is_startup_failure());
        assert_eq!(
            err.to_string(),
            "Invalid session transition from INIT to PROXY_RUNNING"
        );
    }
}
