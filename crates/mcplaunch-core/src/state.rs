//! Session lifecycle state machine.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

use crate::error::LaunchError;

/// Lifecycle state of a launch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Nothing has been started yet.
    Init,
    /// Backend spawn issued, readiness not yet confirmed.
    BackendStarting,
    /// Backend is alive and accepting connections.
    BackendReady,
    /// Foreground proxy is running.
    ProxyRunning,
    /// Teardown in progress.
    ShuttingDown,
    /// Teardown finished. Terminal.
    Terminated,
    /// Startup failed; teardown still pending.
    Failed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{
            BackendReady, BackendStarting, Failed, Init, ProxyRunning, ShuttingDown, Terminated,
        };

        matches!(
            (self, next),
            (Init, BackendStarting | Failed | ShuttingDown)
                | (BackendStarting, BackendReady | Failed | ShuttingDown)
                | (BackendReady, ProxyRunning | Failed | ShuttingDown)
                | (ProxyRunning | Failed, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }

    /// Whether teardown has begun or finished.
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }

    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::BackendStarting => "BACKEND_STARTING",
            Self::BackendReady => "BACKEND_READY",
            Self::ProxyRunning => "PROXY_RUNNING",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Terminated => "TERMINATED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Thread-safe holder for the current [`SessionState`].
///
/// Every transition is validated, and entering `SHUTTING_DOWN` is a
/// test-and-set so only one caller ever performs teardown.
#[derive(Debug)]
pub struct SessionStateCell {
    inner: Mutex<SessionState>,
}

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateCell {
    /// Create a cell in the `INIT` state.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(SessionState::Init),
        }
    }

    /// Current state.
    pub fn get(&self) -> SessionState {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn advance(&self, next: SessionState) -> Result<SessionState, LaunchError> {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !current.can_transition_to(next) {
            return Err(LaunchError::InvalidTransition {
                from: *current,
                to: next,
            });
        }
        debug!(from = %*current, to = %next, "Session state transition");
        let previous = *current;
        *current = next;
        Ok(previous)
    }

    /// Enter `SHUTTING_DOWN`.
    ///
    /// Returns `true` only for the caller that actually made the transition.
    /// Later callers get `false` and must treat teardown as already handled.
    pub fn begin_shutdown(&self) -> bool {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if current.is_shutting_down() {
            return false;
        }
        debug!(from = %*current, "Entering shutdown");
        *current = SessionState::ShuttingDown;
        true
    }

    /// Mark teardown complete.
    pub fn finish(&self) {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *current = SessionState::Terminated;
    }
}
