//! CLI entry point.

use std::process::ExitCode;

use anyhow::Context;
use tracing::error;

use mcplaunch_cli::{Cli, CliError, exit_status, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    // Parse CLI arguments; clap usage errors exit on their own
    let cli = match Cli::parse_launch() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("error: {err}");
            return exit_status(err.exit_code());
        }
    };

    // Initialize logging (stderr only)
    init_tracing(cli.verbose);

    match launch(&cli).await {
        Ok(code) => exit_status(code),
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<CliError>()
                .map_or(mcplaunch_core::EXIT_FAILURE, CliError::exit_code);
            exit_status(code)
        }
    }
}

async fn launch(cli: &Cli) -> anyhow::Result<i32> {
    mcplaunch_cli::run(cli)
        .await
        .context("Could not start launch session")
}
