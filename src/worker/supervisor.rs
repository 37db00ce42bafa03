//! Worker process supervision.
//!
//! The supervisor owns the lifecycle of the analysis worker: it spawns
//! the process, tracks its liveness, and kills it on shutdown. The
//! messaging endpoint shares the worker's lifetime: one endpoint per
//! worker start, disposed together with it.
//!
//! Liveness is judged by two signals: the child handle's exit status
//! (which also reaps the process) and a process-table lookup matching
//! both the pid and the executable name, so a recycled pid belonging to
//! an unrelated process is treated as dead.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::channel::Endpoint;
use super::error::{AnalysisError, AnalysisResult};
use crate::config::{ChannelSettings, Settings, WorkerSettings};

/// File name of the worker executable, expected next to the client binary
/// unless a path override is configured.
pub const WORKER_EXECUTABLE: &str = if cfg!(windows) {
    "pkgscope-worker.exe"
} else {
    "pkgscope-worker"
};

/// Identity of the running worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerHandle {
    pid: u32,
}

impl WorkerHandle {
    /// OS process id of the worker.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Outcome of a best-effort shutdown.
///
/// Teardown never fails the caller; anything that went wrong while
/// killing the worker is captured here (and logged) instead of raised.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// The messaging endpoint was disposed.
    pub endpoint_disposed: bool,
    /// A kill signal was delivered to the worker.
    pub process_killed: bool,
    /// Error swallowed while killing the worker, if any.
    pub kill_error: Option<io::Error>,
}

struct WorkerState {
    child: Child,
    pid: u32,
    process_name: OsString,
    endpoint: Arc<Endpoint>,
}

impl WorkerState {
    fn is_alive(&mut self) -> bool {
        if self.endpoint.is_closed() {
            debug!(pid = self.pid, "worker channel died, treating worker as stale");
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = self.pid, %status, "worker exited");
                false
            }
            Ok(None) => process_matches(self.pid, &self.process_name),
            Err(err) => {
                warn!(pid = self.pid, %err, "could not poll worker status");
                false
            }
        }
    }
}

/// Spawns, reuses, and terminates the analysis worker process.
///
/// All mutable worker state lives in the supervisor instance, so
/// independent clients (and tests) can run side by side without
/// interfering.
pub struct WorkerSupervisor {
    worker: WorkerSettings,
    channel: ChannelSettings,
    state: Option<WorkerState>,
}

impl WorkerSupervisor {
    /// Create a supervisor from settings. No process is started until the
    /// first [`ensure_running`](Self::ensure_running).
    pub fn new(settings: &Settings) -> Self {
        Self {
            worker: settings.worker.clone(),
            channel: settings.channel.clone(),
            state: None,
        }
    }

    /// Pid of the tracked worker, if one is currently tracked.
    pub fn worker_pid(&self) -> Option<u32> {
        self.state.as_ref().map(|state| state.pid)
    }

    /// Return the live worker, starting one if needed.
    ///
    /// A tracked worker that is still alive is returned unchanged. A dead
    /// or replaced one is torn down (best-effort) and a fresh process is
    /// spawned, together with a fresh endpoint.
    pub async fn ensure_running(&mut self) -> AnalysisResult<(WorkerHandle, Arc<Endpoint>)> {
        let alive = match self.state.as_mut() {
            Some(state) => state.is_alive(),
            None => false,
        };

        if alive {
            if let Some(state) = self.state.as_ref() {
                return Ok((
                    WorkerHandle { pid: state.pid },
                    Arc::clone(&state.endpoint),
                ));
            }
        }

        self.shutdown();

        let state = self.start_worker().await?;
        let running = (
            WorkerHandle { pid: state.pid },
            Arc::clone(&state.endpoint),
        );
        self.state = Some(state);
        Ok(running)
    }

    /// Tear down the endpoint and kill the tracked worker, best-effort.
    ///
    /// The handle is cleared unconditionally, even when the kill fails,
    /// so the next [`ensure_running`](Self::ensure_running) attempts a
    /// fresh start instead of retrying a dead reference.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        if let Some(mut state) = self.state.take() {
            state.endpoint.dispose();
            report.endpoint_disposed = true;

            match state.child.start_kill() {
                Ok(()) => {
                    info!(pid = state.pid, "worker killed");
                    report.process_killed = true;
                }
                Err(err) => {
                    warn!(pid = state.pid, %err, "could not kill worker");
                    report.kill_error = Some(err);
                }
            }
        }

        report
    }

    async fn start_worker(&self) -> AnalysisResult<WorkerState> {
        let executable = self.resolve_worker_path()?;
        let process_name = executable
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(WORKER_EXECUTABLE));

        let mut child = Command::new(&executable)
            .args(&self.worker.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(AnalysisError::SpawnFailed)?;

        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                return Err(AnalysisError::SpawnFailed(io::Error::other(
                    "worker exited before startup completed",
                )))
            }
        };
        info!(pid, executable = %executable.display(), "worker started");

        let endpoint = match Endpoint::connect(
            &self.channel.host,
            self.channel.port,
            self.channel.connect_attempts,
            self.channel.connect_retry(),
        )
        .await
        {
            Ok(endpoint) => Arc::new(endpoint),
            Err(err) => {
                if let Err(kill_err) = child.start_kill() {
                    warn!(pid, %kill_err, "could not kill worker after failed channel bootstrap");
                }
                return Err(err);
            }
        };

        Ok(WorkerState {
            child,
            pid,
            process_name,
            endpoint,
        })
    }

    /// Locate the worker executable: the configured override wins,
    /// otherwise [`WORKER_EXECUTABLE`] next to the current executable.
    fn resolve_worker_path(&self) -> AnalysisResult<PathBuf> {
        if let Some(path) = &self.worker.path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(AnalysisError::WorkerMissing(path.clone()));
        }

        let mut path = std::env::current_exe().map_err(AnalysisError::SpawnFailed)?;
        path.set_file_name(WORKER_EXECUTABLE);
        if path.exists() {
            return Ok(path);
        }
        Err(AnalysisError::WorkerMissing(path))
    }
}

/// Check the process table for a live process with this pid and
/// executable name.
fn process_matches(pid: u32, expected_name: &OsStr) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    system
        .process(pid)
        .is_some_and(|process| process.name() == expected_name)
}
