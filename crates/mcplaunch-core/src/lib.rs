//! Core domain types for mcplaunch.
//!
//! This crate has no OS-level logic. It defines the session state machine,
//! the backend endpoint, launch configuration and the error taxonomy shared
//! by the runtime and CLI crates.

#![deny(unused_crate_dependencies)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod outcome;
pub mod state;

pub use config::{
    CommandSpec, DEFAULT_BACKEND_ARGS, DEFAULT_BACKEND_PROGRAM, DEFAULT_ENDPOINT_ENV,
    DEFAULT_ENDPOINT_FLAG, DEFAULT_HOST, DEFAULT_PROXY_PROGRAM, LaunchConfig, ReadinessProbe,
    ShutdownTimeouts,
};
pub use endpoint::BackendEndpoint;
pub use error::LaunchError;
pub use outcome::{
    EXIT_FAILURE, EXIT_PROXY_NOT_FOUND, EXIT_PROXY_SPAWN_FAILED, ExitOutcome, SIGNAL_EXIT_BASE,
};
pub use state::{SessionState, SessionStateCell};
