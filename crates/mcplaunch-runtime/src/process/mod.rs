//! Backend process management.
//!
//! # Structure
//!
//! - `spawn_backend` / `BackendHandle` - start the backend in its own process group
//! - `wait_until_ready` - bounded readiness wait that fails fast on early exit
//! - `terminate_backend` - group-scoped SIGTERM → SIGKILL teardown
//! - `exit_code` / `describe` - exit status conversions

mod readiness;
pub mod shutdown;
mod spawn;
mod status;

pub use readiness::{ReadinessError, wait_until_ready};
pub use shutdown::{BackendTeardown, SignalScope, TeardownOutcome, terminate_backend};
pub use spawn::{BackendHandle, spawn_backend};
pub use status::{describe, exit_code};
