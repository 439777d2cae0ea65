//! Session controller: the top-level lifecycle of one launcher run.
//!
//! A run allocates a port, creates the session log, starts the backend, waits
//! for it, bridges to the proxy and then tears the backend down. Teardown runs
//! exactly once on every path: proxy exit, startup failure or a termination
//! signal. The main sequence and the signal race in one `select!`; whichever
//! loses is dropped and the single shutdown call follows.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use mcplaunch_core::{
    BackendEndpoint, ExitOutcome, LaunchConfig, LaunchError, SessionState, SessionStateCell,
    ShutdownTimeouts,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::logs::SessionLog;
use crate::ports::allocate_port;
use crate::process::{
    BackendHandle, BackendTeardown, ReadinessError, describe, exit_code, spawn_backend,
    terminate_backend, wait_until_ready,
};
use crate::proxy::{ProxyInvocation, launch_proxy};
use crate::signals::{SignalListener, TerminationSignal};

/// What a shutdown call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `false` when another caller had already run teardown.
    pub performed: bool,
    /// Whether this call closed the session log.
    pub log_closed: bool,
    /// Backend teardown details, if a backend was running.
    pub backend: Option<BackendTeardown>,
}

impl ShutdownReport {
    const fn skipped() -> Self {
        Self {
            performed: false,
            log_closed: false,
            backend: None,
        }
    }
}

/// State shared between the main sequence and the shutdown path.
///
/// The backend handle and log live behind async mutexes and are consumed by
/// the first shutdown. A second shutdown sees `SHUTTING_DOWN` already set
/// and returns without touching them.
#[derive(Debug)]
pub struct SessionContext {
    endpoint: BackendEndpoint,
    log_path: PathBuf,
    timeouts: ShutdownTimeouts,
    state: SessionStateCell,
    backend: Mutex<Option<BackendHandle>>,
    log: Mutex<Option<SessionLog>>,
    backend_pid: OnceLock<u32>,
    proxy_launched: AtomicBool,
}

impl SessionContext {
    /// Allocate a port and create the session log. Nothing is spawned yet.
    pub fn prepare(config: &LaunchConfig) -> Result<Self, LaunchError> {
        let port = allocate_port(&config.host)?;
        let endpoint = BackendEndpoint::new(config.host.clone(), port);
        let log = SessionLog::create(&config.log_dir)?;

        Ok(Self {
            endpoint,
            log_path: log.path().to_path_buf(),
            timeouts: config.shutdown,
            state: SessionStateCell::new(),
            backend: Mutex::new(None),
            log: Mutex::new(Some(log)),
            backend_pid: OnceLock::new(),
            proxy_launched: AtomicBool::new(false),
        })
    }

    pub const fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// PID of the backend, once it has been spawned.
    pub fn backend_pid(&self) -> Option<u32> {
        self.backend_pid.get().copied()
    }

    /// Tear the session down: close the log, then stop the backend.
    ///
    /// Safe to call any number of times from any task; only the first call
    /// does anything.
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.state.begin_shutdown() {
            debug!("Shutdown already handled");
            return ShutdownReport::skipped();
        }
        info!("Shutting down backend");

        // The backend keeps its own descriptors, so closing ours first is safe
        let log_closed = match self.log.lock().await.as_mut() {
            Some(log) => log.close().unwrap_or_else(|e| {
                warn!(path = %self.log_path.display(), error = %e, "Failed to flush session log");
                true
            }),
            None => false,
        };

        let taken = self.backend.lock().await.take();
        let backend = match taken {
            Some(mut handle) => Some(terminate_backend(&mut handle, self.timeouts).await),
            None => None,
        };

        self.state.finish();
        ShutdownReport {
            performed: true,
            log_closed,
            backend,
        }
    }

    fn mark_failed(&self) {
        if let Err(e) = self.state.advance(SessionState::Failed) {
            debug!(error = %e, "Not marking session failed");
        }
    }

    /// Captured backend output for startup diagnostics.
    async fn backend_output(&self) -> String {
        let guard = self.log.lock().await;
        let Some(log) = guard.as_ref() else {
            return String::new();
        };
        log.read_tail().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read backend output");
            String::new()
        })
    }

    /// Start the backend and wait until it is ready.
    async fn start_backend(&self, config: &LaunchConfig) -> Result<(), LaunchError> {
        self.state.advance(SessionState::BackendStarting)?;
        info!(
            endpoint = %self.endpoint,
            log = %self.log_path.display(),
            "Starting backend"
        );

        {
            let mut slot = self.backend.lock().await;
            // A shutdown that already ran would never see a handle stored now
            if self.state.get().is_shutting_down() {
                return Err(LaunchError::Internal("session is shutting down".into()));
            }
            let handle = {
                let guard = self.log.lock().await;
                let log = guard
                    .as_ref()
                    .ok_or_else(|| LaunchError::Internal("session log is not available".into()))?;
                spawn_backend(&config.backend, &self.endpoint, log)?
            };
            // Only ever set once per context
            let _ = self.backend_pid.set(handle.pid());
            info!(pid = %handle.pid(), "Backend process started");
            *slot = Some(handle);
        }

        match wait_until_ready(&self.backend, &self.endpoint, config).await {
            Ok(()) => {}
            Err(ReadinessError::Exited(status)) => {
                return Err(LaunchError::BackendExited {
                    code: describe(status),
                    output: self.backend_output().await,
                });
            }
            Err(ReadinessError::TimedOut(after)) => {
                return Err(LaunchError::BackendNotReady {
                    endpoint: self.endpoint.address(),
                    timeout_ms: after.as_millis(),
                });
            }
            Err(ReadinessError::Released) => {
                return Err(LaunchError::Internal("backend was released during startup".into()));
            }
            Err(ReadinessError::Io(e)) => {
                return Err(LaunchError::Internal(format!("readiness wait failed: {e}")));
            }
        }

        self.state.advance(SessionState::BackendReady)?;
        info!(endpoint = %self.endpoint, "Backend ready");
        Ok(())
    }

    /// Run the proxy in the foreground and return its exit code.
    async fn bridge(&self, config: &LaunchConfig, proxy_args: &[String]) -> Result<i32, LaunchError> {
        let invocation = ProxyInvocation::new(
            &config.proxy,
            proxy_args,
            &self.endpoint,
            &config.endpoint_flag,
            &config.endpoint_env,
        );
        self.state.advance(SessionState::ProxyRunning)?;

        let proxy = match launch_proxy(&invocation) {
            Ok(proxy) => proxy,
            Err(e) => {
                error!(error = %e, "Proxy could not be started");
                return Ok(e.exit_code());
            }
        };
        self.proxy_launched.store(true, Ordering::SeqCst);

        let status = proxy
            .wait()
            .await
            .map_err(|e| LaunchError::Internal(format!("waiting for proxy failed: {e}")))?;
        Ok(exit_code(status))
    }

    async fn drive(&self, config: &LaunchConfig, proxy_args: &[String]) -> Result<i32, LaunchError> {
        self.start_backend(config).await?;
        self.bridge(config, proxy_args).await
    }
}

/// Everything known about a finished run.
#[derive(Debug)]
pub struct SessionRun {
    pub outcome: ExitOutcome,
    /// The error that ended the run early, if any.
    pub error: Option<LaunchError>,
    pub endpoint: BackendEndpoint,
    pub log_path: PathBuf,
    pub backend_pid: Option<u32>,
    pub proxy_launched: bool,
    pub shutdown: ShutdownReport,
    pub final_state: SessionState,
}

impl SessionRun {
    /// Process exit code for this run.
    pub const fn exit_code(&self) -> i32 {
        self.outcome.code()
    }
}

/// Runs launch sessions for one configuration.
#[derive(Debug, Clone)]
pub struct SessionController {
    config: LaunchConfig,
}

impl SessionController {
    pub const fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Run one session, stopping early on SIGINT, SIGTERM or SIGHUP.
    ///
    /// Signal handlers are installed before anything is spawned.
    pub async fn run(&self, proxy_args: &[String]) -> Result<SessionRun, LaunchError> {
        match SignalListener::install() {
            Ok(mut listener) => {
                self.run_until(proxy_args, async move { listener.recv().await })
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Could not install signal handlers; continuing without them");
                self.run_until(proxy_args, std::future::pending()).await
            }
        }
    }

    /// Run one session, stopping early when `interrupt` resolves.
    ///
    /// `Err` is returned only if the session could not be prepared, in which
    /// case nothing was started. Every other failure is reported in the
    /// returned [`SessionRun`] after teardown.
    pub async fn run_until<F>(
        &self,
        proxy_args: &[String],
        interrupt: F,
    ) -> Result<SessionRun, LaunchError>
    where
        F: Future<Output = TerminationSignal>,
    {
        self.config.validate()?;
        let ctx = Arc::new(SessionContext::prepare(&self.config)?);

        let (outcome, error) = tokio::select! {
            result = ctx.drive(&self.config, proxy_args) => match result {
                Ok(code) => (ExitOutcome::Proxy(code), None),
                Err(e) => {
                    ctx.mark_failed();
                    error!(error = %e, "Session failed");
                    let outcome = if e.is_startup_failure() {
                        ExitOutcome::StartupFailed
                    } else {
                        ExitOutcome::Internal
                    };
                    (outcome, Some(e))
                }
            },
            signal = interrupt => {
                warn!(signal = %signal, state = %ctx.state(), "Received termination signal");
                (ExitOutcome::Signaled(signal.number()), None)
            }
        };

        let shutdown = ctx.shutdown().await;
        if let Some(teardown) = &shutdown.backend {
            debug!(report = %teardown, "Backend teardown report");
        }
        info!(code = outcome.code(), "Shutdown complete. Final exit code: {}", outcome.code());

        Ok(SessionRun {
            outcome,
            error,
            endpoint: ctx.endpoint().clone(),
            log_path: ctx.log_path().to_path_buf(),
            backend_pid: ctx.backend_pid(),
            proxy_launched: ctx.proxy_launched.load(Ordering::SeqCst),
            shutdown,
            final_state: ctx.state(),
        })
    }
}
