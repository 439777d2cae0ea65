//! Termination signal listener.
//!
//! Signals only resolve a future here. Whoever awaits [`SignalListener::recv`]
//! runs teardown in ordinary task context afterwards.

use std::fmt;
use std::io;

use tracing::debug;

/// A signal asking the launcher to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl TerminationSignal {
    /// POSIX signal number, used for the `128 + n` exit code.
    pub const fn number(self) -> i32 {
        match self {
            Self::Hangup => 1,
            Self::Interrupt => 2,
            Self::Terminate => 15,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Installed handlers for SIGINT, SIGTERM and SIGHUP.
///
/// Install before starting any child so a signal arriving during startup is
/// never lost or left to the default disposition.
#[cfg(unix)]
pub struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let listener = Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        };
        debug!("Signal handlers installed");
        Ok(listener)
    }

    /// Wait for the next termination signal.
    pub async fn recv(&mut self) -> TerminationSignal {
        tokio::select! {
            Some(()) = self.interrupt.recv() => TerminationSignal::Interrupt,
            Some(()) = self.terminate.recv() => TerminationSignal::Terminate,
            Some(()) = self.hangup.recv() => TerminationSignal::Hangup,
            else => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
pub struct SignalListener {
    _private: (),
}

#[cfg(not(unix))]
impl SignalListener {
    pub fn install() -> io::Result<Self> {
        debug!("Ctrl-C handler installed");
        Ok(Self { _private: () })
    }

    pub async fn recv(&mut self) -> TerminationSignal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => TerminationSignal::Interrupt,
            Err(_) => std::future::pending().await,
        }
    }
}
