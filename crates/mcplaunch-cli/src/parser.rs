//! Command-line interface definition.
//!
//! Every launcher option is optional so a config file can supply it; the
//! precedence is CLI flag, then `MCPLAUNCH_*` environment variable, then the
//! config file, then the built-in default.
//!
//! Launcher options must come before a `--` separator. Everything after the
//! first `--` goes to the proxy untouched. With no `--` at all, every
//! argument belongs to the proxy and the launcher is configured only through
//! `MCPLAUNCH_*` variables and the config file.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::CliError;

const SEPARATOR: &str = "--";

/// Start a local backend server, bridge stdio to a proxy, and clean up.
///
/// Usage: `mcplaunch [OPTIONS] -- [PROXY_ARGS]...` or `mcplaunch [PROXY_ARGS]...`.
/// Without `--`, all arguments are passed to the proxy verbatim.
#[derive(Debug, Parser)]
#[command(name = "mcplaunch")]
#[command(about = "Run a backend server behind a foreground stdio proxy")]
#[command(version)]
pub struct Cli {
    /// JSON config file with launch settings
    #[arg(long, env = "MCPLAUNCH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host the backend binds to
    #[arg(long, env = "MCPLAUNCH_HOST")]
    pub host: Option<String>,

    /// Backend executable
    #[arg(long = "backend-program", env = "MCPLAUNCH_BACKEND_PROGRAM", value_name = "PROGRAM")]
    pub backend_program: Option<String>,

    /// Backend argument, repeatable; `--host` and `--port` are appended
    #[arg(long = "backend-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub backend_args: Vec<String>,

    /// Proxy executable
    #[arg(long = "proxy-program", env = "MCPLAUNCH_PROXY_PROGRAM", value_name = "PROGRAM")]
    pub proxy_program: Option<String>,

    /// Flag used to pass the backend URL to the proxy
    #[arg(long = "endpoint-flag", env = "MCPLAUNCH_ENDPOINT_FLAG", allow_hyphen_values = true)]
    pub endpoint_flag: Option<String>,

    /// Environment variable used to pass the backend URL to the proxy
    #[arg(long = "endpoint-env", env = "MCPLAUNCH_ENDPOINT_ENV", value_name = "NAME")]
    pub endpoint_env: Option<String>,

    /// Directory for the per-run backend log
    #[arg(long = "log-dir", env = "MCPLAUNCH_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// How to decide the backend is ready
    #[arg(long, env = "MCPLAUNCH_READINESS", value_enum)]
    pub readiness: Option<ReadinessMode>,

    /// Health endpoint path for `--readiness http`
    #[arg(long = "health-path", env = "MCPLAUNCH_HEALTH_PATH", value_name = "PATH")]
    pub health_path: Option<String>,

    /// Overall readiness deadline in milliseconds
    #[arg(long = "startup-timeout-ms", env = "MCPLAUNCH_STARTUP_TIMEOUT_MS")]
    pub startup_timeout_ms: Option<u64>,

    /// Fixed wait for `--readiness delay` in milliseconds
    #[arg(long = "startup-delay-ms", env = "MCPLAUNCH_STARTUP_DELAY_MS")]
    pub startup_delay_ms: Option<u64>,

    /// Grace period after SIGTERM in milliseconds
    #[arg(long = "term-timeout-ms", env = "MCPLAUNCH_TERM_TIMEOUT_MS")]
    pub term_timeout_ms: Option<u64>,

    /// Wait after SIGKILL in milliseconds
    #[arg(long = "kill-timeout-ms", env = "MCPLAUNCH_KILL_TIMEOUT_MS")]
    pub kill_timeout_ms: Option<u64>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Arguments forwarded to the proxy, filled in by [`Cli::parse_launch`]
    #[arg(skip)]
    pub proxy_args: Vec<String>,
}

impl Cli {
    /// Parse the process arguments, exiting on usage errors like
    /// [`Parser::parse`].
    pub fn parse_launch() -> Result<Self, CliError> {
        let (options, proxy_args) = split_args(std::env::args_os())?;
        let mut cli = Self::parse_from(options);
        cli.proxy_args = proxy_args;
        Ok(cli)
    }

    /// Parse `args` (including the program name) without exiting.
    pub fn try_parse_launch<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let (options, proxy_args) = split_args(args)?;
        let mut cli =
            Self::try_parse_from(options).map_err(|e| CliError::Arguments(e.to_string()))?;
        cli.proxy_args = proxy_args;
        Ok(cli)
    }
}

/// Split `args` into launcher options (with the program name) and proxy args.
fn split_args<I, T>(args: I) -> Result<(Vec<OsString>, Vec<String>), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let program = args.next().unwrap_or_else(|| OsString::from("mcplaunch"));
    let rest: Vec<OsString> = args.collect();

    let (options, forwarded) = match rest.iter().position(|arg| arg == SEPARATOR) {
        Some(at) => (rest[..at].to_vec(), &rest[at + 1..]),
        None => (Vec::new(), rest.as_slice()),
    };

    let proxy_args = forwarded
        .iter()
        .map(|arg| {
            arg.clone().into_string().map_err(|raw| {
                CliError::Arguments(format!("proxy argument is not valid UTF-8: {raw:?}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut launcher = Vec::with_capacity(options.len() + 1);
    launcher.push(program);
    launcher.extend(options);
    Ok((launcher, proxy_args))
}

/// Readiness strategies selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReadinessMode {
    /// Retry TCP connects to the backend port
    Tcp,
    /// Retry an HTTP GET of the health path
    Http,
    /// Wait a fixed delay and check the backend is still alive
    Delay,
}
