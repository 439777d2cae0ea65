//! Command-line adapter for mcplaunch: argument parsing, configuration
//! assembly, tracing setup and exit-code mapping.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the binary target only
use anyhow as _;
use dotenvy as _;
use tokio as _;

#[cfg(all(test, unix))]
use nix as _;

pub mod config;
pub mod error;
pub mod logging;
pub mod parser;

use std::process::ExitCode;

use mcplaunch_runtime::SessionController;

pub use config::{DEFAULT_HEALTH_PATH, load_config_file, resolve_config};
pub use error::CliError;
pub use logging::init_tracing;
pub use parser::{Cli, ReadinessMode};

/// Run one session for `cli` and return the code the process should exit with.
pub async fn run(cli: &Cli) -> Result<i32, CliError> {
    let config = resolve_config(cli)?;
    let session = SessionController::new(config).run(&cli.proxy_args).await?;
    Ok(session.exit_code())
}

/// Clamp a shell-style exit code to what a process can report.
///
/// Codes outside `0..=255` become a plain failure.
pub fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

/// Process exit status for a shell-style exit code.
pub fn exit_status(code: i32) -> ExitCode {
    ExitCode::from(exit_byte(code))
}
