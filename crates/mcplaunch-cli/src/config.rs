//! Launch configuration assembly from file, environment and flags.

use std::fs;
use std::path::Path;
use std::time::Duration;

use mcplaunch_core::{CommandSpec, LaunchConfig, ReadinessProbe};
use tracing::debug;

use crate::error::CliError;
use crate::parser::{Cli, ReadinessMode};

/// Health path used when `--readiness http` is given without `--health-path`.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Read a JSON config file. Missing keys keep their defaults.
pub fn load_config_file(path: &Path) -> Result<LaunchConfig, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

/// Build the effective configuration for this invocation and validate it.
pub fn resolve_config(cli: &Cli) -> Result<LaunchConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            debug!(path = %path.display(), "Loading config file");
            load_config_file(path)?
        }
        None => LaunchConfig::default(),
    };

    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut LaunchConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.host.clone_from(host);
    }

    // A new backend program does not inherit the old program's arguments
    if let Some(program) = &cli.backend_program {
        config.backend = CommandSpec::new(program.clone(), cli.backend_args.iter().cloned());
    } else if !cli.backend_args.is_empty() {
        config.backend.args.clone_from(&cli.backend_args);
    }

    if let Some(program) = &cli.proxy_program {
        config.proxy = CommandSpec::new(program.clone(), Vec::<String>::new());
    }
    if let Some(flag) = &cli.endpoint_flag {
        config.endpoint_flag.clone_from(flag);
    }
    if let Some(name) = &cli.endpoint_env {
        config.endpoint_env.clone_from(name);
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir.clone_from(dir);
    }

    match (cli.readiness, &cli.health_path) {
        (Some(ReadinessMode::Tcp), _) => config.readiness = ReadinessProbe::Tcp,
        (Some(ReadinessMode::Delay), _) => config.readiness = ReadinessProbe::Delay,
        (Some(ReadinessMode::Http), path) => {
            config.readiness = ReadinessProbe::Http {
                path: path.clone().unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
            };
        }
        // A health path on its own implies an HTTP probe
        (None, Some(path)) => config.readiness = ReadinessProbe::Http { path: path.clone() },
        (None, None) => {}
    }

    if let Some(ms) = cli.startup_timeout_ms {
        config.startup_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.startup_delay_ms {
        config.startup_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.term_timeout_ms {
        config.shutdown.term = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.kill_timeout_ms {
        config.shutdown.kill = Duration::from_millis(ms);
    }
}
