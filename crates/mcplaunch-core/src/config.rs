//! Launch configuration.
//!
//! `LaunchConfig` is intent-based: it says which backend and proxy to run and
//! how patient to be with them. Port allocation and log paths are decided at
//! session start, not here.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LaunchError;

/// Host the backend binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Backend interpreter.
pub const DEFAULT_BACKEND_PROGRAM: &str = "python3";
/// Backend module invocation (uvicorn serving the bundled app).
pub const DEFAULT_BACKEND_ARGS: &[&str] = &["-m", "uvicorn", "server.app:app"];
/// Foreground proxy executable.
pub const DEFAULT_PROXY_PROGRAM: &str = "dba-mcp-proxy";
/// Flag used to hand the backend URL to the proxy.
pub const DEFAULT_ENDPOINT_FLAG: &str = "--databricks-app-url";
/// Environment variable carrying the backend URL for env-configured proxies.
pub const DEFAULT_ENDPOINT_ENV: &str = "DATABRICKS_APP_URL";

/// A program plus its fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments always passed before anything the launcher appends.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command from a program and its fixed arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// How the launcher decides the backend is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReadinessProbe {
    /// Retry TCP connects to the endpoint until one succeeds.
    Tcp,
    /// Retry `GET <url><path>` until it answers with a 2xx status.
    Http {
        /// Request path, e.g. `/health`.
        path: String,
    },
    /// Wait a fixed delay, then only check that the backend is still alive.
    Delay,
}

/// Bounded waits used when tearing the backend down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownTimeouts {
    /// Grace period after SIGTERM.
    #[serde(rename = "term_timeout_ms", with = "duration_ms")]
    pub term: Duration,
    /// Wait after SIGKILL before giving up on reaping.
    #[serde(rename = "kill_timeout_ms", with = "duration_ms")]
    pub kill: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            term: Duration::from_secs(5),
            kill: Duration::from_secs(2),
        }
    }
}

/// Full configuration for one launch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Host the backend binds to and the proxy connects to.
    pub host: String,
    /// Backend command; `--host` and `--port` are appended.
    pub backend: CommandSpec,
    /// Proxy command; caller arguments and the endpoint flag are appended.
    pub proxy: CommandSpec,
    /// Flag name carrying the backend URL to the proxy.
    pub endpoint_flag: String,
    /// Environment variable carrying the backend URL to the proxy.
    pub endpoint_env: String,
    /// Directory that receives the per-run backend log.
    pub log_dir: PathBuf,
    /// Readiness strategy.
    pub readiness: ReadinessProbe,
    /// Overall deadline for the backend to become ready.
    #[serde(rename = "startup_timeout_ms", with = "duration_ms")]
    pub startup_timeout: Duration,
    /// Fixed wait used by [`ReadinessProbe::Delay`].
    #[serde(rename = "startup_delay_ms", with = "duration_ms")]
    pub startup_delay: Duration,
    /// Pause between readiness attempts.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Teardown timeouts.
    pub shutdown: ShutdownTimeouts,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            backend: CommandSpec::new(DEFAULT_BACKEND_PROGRAM, DEFAULT_BACKEND_ARGS.iter().copied()),
            proxy: CommandSpec::new(DEFAULT_PROXY_PROGRAM, Vec::<String>::new()),
            endpoint_flag: DEFAULT_ENDPOINT_FLAG.to_string(),
            endpoint_env: DEFAULT_ENDPOINT_ENV.to_string(),
            log_dir: std::env::temp_dir(),
            readiness: ReadinessProbe::Tcp,
            startup_timeout: Duration::from_secs(30),
            startup_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            shutdown: ShutdownTimeouts::default(),
        }
    }
}

impl LaunchConfig {
    /// Set the backend command.
    #[must_use]
    pub fn with_backend(mut self, backend: CommandSpec) -> Self {
        self.backend = backend;
        self
    }

    /// Set the proxy command.
    #[must_use]
    pub fn with_proxy(mut self, proxy: CommandSpec) -> Self {
        self.proxy = proxy;
        self
    }

    /// Set the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Set the readiness strategy.
    #[must_use]
    pub fn with_readiness(mut self, probe: ReadinessProbe) -> Self {
        self.readiness = probe;
        self
    }

    /// Set the readiness deadline.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the fixed readiness delay.
    #[must_use]
    pub const fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Set the teardown timeouts.
    #[must_use]
    pub const fn with_shutdown(mut self, shutdown: ShutdownTimeouts) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Reject configurations that cannot produce a working session.
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.host.trim().is_empty() {
            return Err(LaunchError::Config("host must not be empty".into()));
        }
        if self.backend.program.trim().is_empty() {
            return Err(LaunchError::Config("backend program must not be empty".into()));
        }
        if self.proxy.program.trim().is_empty() {
            return Err(LaunchError::Config("proxy program must not be empty".into()));
        }
        if self.endpoint_flag.trim().is_empty() {
            return Err(LaunchError::Config("endpoint flag must not be empty".into()));
        }
        if self.endpoint_env.is_empty()
            || self.endpoint_env.contains('=')
            || self.endpoint_env.contains('\0')
        {
            return Err(LaunchError::Config(format!(
                "invalid endpoint environment variable name: {:?}",
                self.endpoint_env
            )));
        }
        if let ReadinessProbe::Http { path } = &self.readiness {
            if !path.starts_with('/') {
                return Err(LaunchError::Config(format!(
                    "health path must start with '/': {path}"
                )));
            }
        }
        if self.startup_timeout.is_zero() {
            return Err(LaunchError::Config("startup timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(LaunchError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Durations are written as whole milliseconds in config files.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
