//! OS-level runtime for mcplaunch: port allocation, the session log, backend
//! process management, the proxy bridge, signal handling and the session
//! controller that ties them together.

#![deny(unsafe_code)]

pub mod logs;
pub mod ports;
pub mod process;
pub mod proxy;
pub mod session;
pub mod signals;

// Re-export the session entry points
pub use session::{SessionContext, SessionController, SessionRun, ShutdownReport};

// Re-export building blocks for callers composing their own lifecycle
pub use logs::{SessionLog, session_log_path};
pub use ports::allocate_port;
pub use process::{
    BackendHandle, BackendTeardown, ReadinessError, SignalScope, TeardownOutcome, spawn_backend,
    terminate_backend, wait_until_ready,
};
pub use proxy::{ProxyInvocation, ProxyProcess, ProxySpawnError, launch_proxy};
pub use signals::{SignalListener, TerminationSignal};
