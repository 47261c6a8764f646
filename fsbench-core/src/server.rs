// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Storage-server lifecycle.
//!
//! Spawns the server with its resource id space on argv, waits for the
//! readiness sentinel, and on shutdown writes the exit sentinel and waits
//! out a grace period before escalating to a forced kill.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use serde::Serialize;
use tokio::process::Child;

use crate::error::{ServerError, StateTransitionError};
use crate::invocation::{CommandSpec, ServerLaunchArgs, READY_FILE_ENV};
use crate::lease::ServerLease;
use crate::sentinel::{Sentinel, EXIT_NOTE};
use crate::state::{ServerState, ServerStateMachine};
use crate::types::{ProcessId, ProcessName};

/// Default readiness poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time the server gets to exit after the exit sentinel appears.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// How long to wait for the kernel to reap a killed server.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Static description of how to run the server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub program: PathBuf,
    pub process_name: ProcessName,
    pub ready_sentinel: PathBuf,
    pub exit_sentinel: PathBuf,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
    /// `None` waits for readiness as long as the process stays alive.
    pub startup_timeout: Option<Duration>,
}

/// What a forced kill is aimed at.
#[derive(Debug, Clone)]
pub struct KillTarget {
    pub pid: Option<ProcessId>,
    pub name: ProcessName,
}

/// Out-of-band termination used once the grace period has elapsed.
pub trait ForceKill {
    fn force_kill(
        &self,
        target: &KillTarget,
    ) -> impl std::future::Future<Output = Result<(), ServerError>> + Send;
}

/// SIGKILL to the exact pid, then `pkill -KILL -x <name>` as a safety net
/// for strays the handle does not cover. Name matching is only sound while
/// the server-slot lease guarantees a single server on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalReaper;

impl ForceKill for SignalReaper {
    async fn force_kill(&self, target: &KillTarget) -> Result<(), ServerError> {
        if let Some(pid) = target.pid {
            match kill(pid.as_nix(), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => {
                    return Err(ServerError::ForceKillFailed {
                        name: target.name.to_string(),
                        reason: format!("kill({}) failed: {}", pid, errno),
                    });
                }
            }
        }

        let pkill = CommandSpec::new("pkill").args(["-KILL", "-x", target.name.as_str()]);
        let status = pkill.to_command().stdout(Stdio::null()).status().await;
        match status {
            Ok(status) if status.success() => {
                tracing::warn!(name = %target.name, "Killed server processes by name");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(name = %target.name, error = %e, "pkill unavailable");
            }
        }

        Ok(())
    }
}

/// How a shutdown request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownOutcome {
    /// Server exited within the grace period.
    Clean { exit_code: Option<i32> },
    /// Grace period elapsed and the server was killed.
    ForceKilled,
    /// There was no ready server to stop.
    NotRunning,
}

/// One live server invocation.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    pid: Option<ProcessId>,
    argv: Vec<String>,
}

impl ServerProcess {
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Owns exactly one server process and its lifecycle state.
pub struct ServerController<K: ForceKill = SignalReaper> {
    settings: ServerSettings,
    ready: Sentinel,
    exit: Sentinel,
    killer: K,
    machine: ServerStateMachine,
    process: Option<ServerProcess>,
}

impl ServerController<SignalReaper> {
    pub fn new(settings: ServerSettings) -> Self {
        Self::with_killer(settings, SignalReaper)
    }
}

impl<K: ForceKill> ServerController<K> {
    pub fn with_killer(settings: ServerSettings, killer: K) -> Self {
        Self {
            ready: Sentinel::new(&settings.ready_sentinel),
            exit: Sentinel::new(&settings.exit_sentinel),
            settings,
            killer,
            machine: ServerStateMachine::new(),
            process: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.machine.state()
    }

    pub fn process(&self) -> Option<&ServerProcess> {
        self.process.as_ref()
    }

    /// Launch the server and block until it is ready or has died.
    ///
    /// `log` receives the server's stdout; `None` inherits ours.
    pub async fn start(
        &mut self,
        lease: &ServerLease,
        args: &ServerLaunchArgs,
        log: Option<&Path>,
    ) -> Result<(), ServerError> {
        self.machine.check(ServerState::Starting)?;

        self.ready.clear()?;
        self.exit.clear()?;

        let stdout = match log {
            Some(path) => Stdio::from(File::create(path).map_err(|e| ServerError::LogFile {
                path: path.to_path_buf(),
                source: e,
            })?),
            None => Stdio::inherit(),
        };

        let argv = args.argv(self.exit.path());
        let spec = CommandSpec::new(&self.settings.program)
            .args(argv.iter().cloned())
            .env(READY_FILE_ENV, self.ready.path().display().to_string());
        let mut cmd = spec.to_command();
        cmd.stdout(stdout).kill_on_drop(true);

        self.machine.transition_to(ServerState::Starting)?;

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Err(self.fail(ServerError::SpawnFailed {
                    program: spec.program_name(),
                    source: e,
                }));
            }
        };
        let pid = child.id().and_then(|raw| ProcessId::new(raw).ok());

        tracing::info!(
            pid = ?pid.map(|p| p.value()),
            lease = %lease.path().display(),
            command = %spec,
            "Spawned server"
        );

        let started = Instant::now();
        loop {
            if self.ready.is_present() {
                break;
            }

            let exited = match child.try_wait() {
                Ok(status) => status,
                Err(e) => return Err(self.fail(ServerError::Wait { source: e })),
            };
            if let Some(status) = exited {
                // The sentinel may have landed between the two checks.
                if self.ready.is_present() {
                    break;
                }
                return Err(self.fail(ServerError::UnexpectedExit {
                    code: status.code(),
                }));
            }

            if let Some(limit) = self.settings.startup_timeout {
                if started.elapsed() >= limit {
                    let _ = child.start_kill();
                    let _ = tokio::time::timeout(REAP_TIMEOUT, child.wait()).await;
                    return Err(self.fail(ServerError::StartupTimeout {
                        timeout_ms: limit.as_millis() as u64,
                    }));
                }
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }

        self.machine.transition_to(ServerState::Ready)?;
        tracing::info!(
            pid = ?pid.map(|p| p.value()),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Server signalled readiness"
        );

        self.process = Some(ServerProcess { child, pid, argv });
        Ok(())
    }

    /// Ask the server to exit and wait for it, killing it after the grace
    /// period. A no-op unless the server is Ready.
    pub async fn shutdown(&mut self) -> Result<ShutdownOutcome, ServerError> {
        if self.machine.state() != ServerState::Ready {
            tracing::debug!(state = %self.machine.state(), "Shutdown skipped");
            return Ok(ShutdownOutcome::NotRunning);
        }
        let Some(mut process) = self.process.take() else {
            return Err(StateTransitionError::InvalidTransition {
                from: ServerState::Ready.name(),
                to: ServerState::ShuttingDown.name(),
            }
            .into());
        };

        if let Err(e) = self.exit.raise(EXIT_NOTE) {
            tracing::warn!(error = %e, "Could not request graceful shutdown");
            self.machine.transition_to(ServerState::ShuttingDown)?;
            return self.escalate(process).await;
        }
        self.machine.transition_to(ServerState::ShuttingDown)?;

        let grace = self.settings.shutdown_grace;
        let waited = tokio::time::timeout(grace, process.child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                self.machine.transition_to(ServerState::Terminated)?;
                tracing::info!(
                    pid = ?process.pid.map(|p| p.value()),
                    exit_code = ?status.code(),
                    "Server exited"
                );
                Ok(ShutdownOutcome::Clean {
                    exit_code: status.code(),
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Waiting for server exit failed");
                self.escalate(process).await
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Server did not exit within grace period; forcing shutdown"
                );
                self.escalate(process).await
            }
        }
    }

    async fn escalate(&mut self, mut process: ServerProcess) -> Result<ShutdownOutcome, ServerError> {
        let target = KillTarget {
            pid: process.pid,
            name: self.settings.process_name.clone(),
        };
        let killed = self.killer.force_kill(&target).await;
        let reaped = tokio::time::timeout(REAP_TIMEOUT, process.child.wait())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);

        self.machine.transition_to(ServerState::ForceKilled)?;

        match killed {
            Err(e) if !reaped => Err(e),
            _ => Ok(ShutdownOutcome::ForceKilled),
        }
    }

    fn fail(&mut self, err: ServerError) -> ServerError {
        if let Err(e) = self.machine.transition_to(ServerState::Failed) {
            tracing::debug!(error = %e, "Failed transition rejected");
        }
        tracing::error!(error = %err, "Server failed to start");
        err
    }
}
