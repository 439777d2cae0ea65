//! Backend readiness detection.
//!
//! Readiness is a bounded retry loop: probe the endpoint, and between probes
//! check the backend so an early exit fails the wait at once instead of after
//! the deadline.
//!
//! The backend slot is only locked for each exit check, never across a probe
//! or a sleep, so a concurrent shutdown can take the handle at any point.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use mcplaunch_core::{BackendEndpoint, LaunchConfig, ReadinessProbe};
use reqwest::Client;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info};

use super::spawn::BackendHandle;

/// Per-attempt limit for a single probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the backend never became ready.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The backend exited while we were waiting.
    #[error("backend exited with status {0}")]
    Exited(ExitStatus),

    /// The backend stayed alive but never answered.
    #[error("backend not ready after {0:?}")]
    TimedOut(Duration),

    /// The backend handle was taken out of its slot, usually by shutdown.
    #[error("backend was released while waiting")]
    Released,

    /// Waiting on the child or building the probe failed.
    #[error("readiness check failed: {0}")]
    Io(#[from] io::Error),
}

/// Wait until the backend at `endpoint` is ready according to `config`.
///
/// `backend` is the slot the handle lives in; it must hold the handle when
/// the wait starts.
pub async fn wait_until_ready(
    backend: &Mutex<Option<BackendHandle>>,
    endpoint: &BackendEndpoint,
    config: &LaunchConfig,
) -> Result<(), ReadinessError> {
    let prober = match &config.readiness {
        ReadinessProbe::Delay => {
            return wait_fixed_delay(backend, config.startup_delay, config.poll_interval).await;
        }
        ReadinessProbe::Tcp => Prober::Tcp {
            address: endpoint.address(),
        },
        ReadinessProbe::Http { path } => Prober::Http {
            client: Client::builder()
                .timeout(PROBE_TIMEOUT)
                .no_proxy()
                .build()
                .map_err(io::Error::other)?,
            url: format!("{}{}", endpoint.url(), path),
        },
    };

    info!(endpoint = %endpoint, probe = prober.kind(), "Waiting for backend to accept connections");
    poll_until_ready(backend, &prober, config.startup_timeout, config.poll_interval).await
}

/// Fail with [`ReadinessError::Exited`] if the backend has exited.
async fn check_running(backend: &Mutex<Option<BackendHandle>>) -> Result<(), ReadinessError> {
    let mut slot = backend.lock().await;
    let handle = slot.as_mut().ok_or(ReadinessError::Released)?;
    match handle.try_exit_status()? {
        Some(status) => Err(ReadinessError::Exited(status)),
        None => Ok(()),
    }
}

/// Sleep for `delay`, failing early if the backend exits in the meantime.
async fn wait_fixed_delay(
    backend: &Mutex<Option<BackendHandle>>,
    delay: Duration,
    interval: Duration,
) -> Result<(), ReadinessError> {
    debug!(delay = ?delay, "Waiting fixed startup delay");
    let deadline = Instant::now() + delay;
    loop {
        check_running(backend).await?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        sleep(interval.min(deadline - now)).await;
    }
}

async fn poll_until_ready(
    backend: &Mutex<Option<BackendHandle>>,
    prober: &Prober,
    deadline_after: Duration,
    interval: Duration,
) -> Result<(), ReadinessError> {
    let deadline = Instant::now() + deadline_after;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        check_running(backend).await?;

        if prober.attempt().await {
            // Something answered; make sure it was not a stranger on a port our
            // backend failed to bind
            check_running(backend).await?;
            info!(attempt = %attempt, "Backend is ready");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ReadinessError::TimedOut(deadline_after));
        }

        debug!(attempt = %attempt, "Backend not ready yet, retrying");
        sleep(interval.min(deadline - now)).await;
    }
}

enum Prober {
    Tcp { address: String },
    Http { client: Client, url: String },
}

impl Prober {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Http { .. } => "http",
        }
    }

    async fn attempt(&self) -> bool {
        match self {
            Self::Tcp { address } => matches!(
                timeout(PROBE_TIMEOUT, TcpStream::connect(address.as_str())).await,
                Ok(Ok(_))
            ),
            Self::Http { client, url } => match client.get(url).send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    debug!(status = %response.status(), "Health check returned non-success status");
                    false
                }
                Err(e) => {
                    debug!(error = %e, "Health check failed");
                    false
                }
            },
        }
    }
}
