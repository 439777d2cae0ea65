//! Foreground proxy bridge.
//!
//! The proxy inherits the launcher's stdin, stdout and stderr untouched; the
//! launcher never reads or writes its data stream. The backend endpoint is
//! handed over twice: as a trailing `<flag> <url>` argument pair and as an
//! environment variable.

use std::io;
use std::process::{ExitStatus, Stdio};

use mcplaunch_core::{BackendEndpoint, CommandSpec, EXIT_PROXY_NOT_FOUND, EXIT_PROXY_SPAWN_FAILED};
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// The proxy could not be started at all.
#[derive(Debug, Error)]
#[error("failed to start proxy '{program}': {source}")]
pub struct ProxySpawnError {
    pub program: String,
    #[source]
    pub source: io::Error,
}

impl ProxySpawnError {
    /// Shell convention: 127 when the program does not exist, 126 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.source.kind() {
            io::ErrorKind::NotFound => EXIT_PROXY_NOT_FOUND,
            _ => EXIT_PROXY_SPAWN_FAILED,
        }
    }
}

/// Fully resolved proxy command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: (String, String),
}

impl ProxyInvocation {
    /// Build the invocation: configured args, then caller args verbatim, then
    /// `<endpoint_flag> <url>`.
    pub fn new(
        spec: &CommandSpec,
        caller_args: &[String],
        endpoint: &BackendEndpoint,
        endpoint_flag: &str,
        endpoint_env: &str,
    ) -> Self {
        let url = endpoint.url();
        let mut args = Vec::with_capacity(spec.args.len() + caller_args.len() + 2);
        args.extend(spec.args.iter().cloned());
        args.extend(caller_args.iter().cloned());
        args.push(endpoint_flag.to_string());
        args.push(url.clone());

        Self {
            program: spec.program.clone(),
            args,
            env: (endpoint_env.to_string(), url),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(&self.env.0, &self.env.1)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

/// Running proxy process.
#[derive(Debug)]
pub struct ProxyProcess {
    child: Child,
    pid: Option<u32>,
}

impl ProxyProcess {
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Block until the proxy exits.
    pub async fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        debug!(pid = ?self.pid, status = %status, "Proxy exited");
        Ok(status)
    }
}

/// Start the proxy in the foreground.
///
/// It stays in the launcher's process group so an interactive interrupt
/// reaches it the same way it would if it ran standalone.
pub fn launch_proxy(invocation: &ProxyInvocation) -> Result<ProxyProcess, ProxySpawnError> {
    let child = invocation
        .command()
        .spawn()
        .map_err(|source| ProxySpawnError {
            program: invocation.program.clone(),
            source,
        })?;
    let pid = child.id();

    info!(
        program = %invocation.program,
        pid = ?pid,
        endpoint = %invocation.env.1,
        "Proxy started"
    );
    Ok(ProxyProcess { child, pid })
}
