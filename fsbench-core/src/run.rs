// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark run coordination.
//!
//! A run is one coordinator process plus one worker per core. Everything is
//! launched up front, then every member is waited for and its exit recorded.
//! A failing member never leaves siblings unaccounted for: by default the
//! rest are still drained to completion, and with `fail_fast` they are
//! killed first and then drained.

use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Child;

use crate::affinity::pin_to_core;
use crate::alloc::ResourceIdSpace;
use crate::error::RunError;
use crate::invocation::{LaunchSpec, WorkerSlot};
use crate::types::{CoreId, ProcessId};

/// Poll interval while watching members in fail-fast mode.
const FAIL_FAST_POLL: Duration = Duration::from_millis(50);

/// Knobs for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Kill the remaining members as soon as one fails.
    pub fail_fast: bool,
    /// Pin each worker to its core with `sched_setaffinity` after spawning.
    pub pin_affinity: bool,
}

/// Which part of the run a member plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MemberRole {
    Coordinator,
    Worker { core: u32 },
}

/// How a member ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitRecord {
    Exited { code: i32 },
    Signaled { signal: i32 },
    SpawnFailed { reason: String },
    WaitFailed { reason: String },
}

impl ExitRecord {
    fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited { code },
            (None, Some(signal)) => Self::Signaled { signal },
            (None, None) => Self::WaitFailed {
                reason: format!("unrecognised exit status: {}", status),
            },
        }
    }

    /// Exit code, when the member exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

/// Outcome of one member process.
#[derive(Debug, Clone, Serialize)]
pub struct MemberResult {
    pub label: String,
    #[serde(flatten)]
    pub role: MemberRole,
    pub pid: Option<u32>,
    pub exit: ExitRecord,
}

impl MemberResult {
    pub fn succeeded(&self) -> bool {
        self.exit == ExitRecord::Exited { code: 0 }
    }
}

/// Aggregate of every member's exit for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub num_cores: u32,
    pub elapsed_ms: u64,
    pub members: Vec<MemberResult>,
}

impl RunResult {
    /// True iff every member exited with code 0.
    pub fn success(&self) -> bool {
        self.members.iter().all(MemberResult::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MemberResult> {
        self.members.iter().filter(|m| !m.succeeded())
    }

    pub fn coordinator(&self) -> Option<&MemberResult> {
        self.members
            .iter()
            .find(|m| m.role == MemberRole::Coordinator)
    }

    pub fn worker(&self, core: u32) -> Option<&MemberResult> {
        self.members
            .iter()
            .find(|m| m.role == MemberRole::Worker { core })
    }
}

/// A launched (or failed-to-launch) member awaiting its exit.
struct Member {
    label: String,
    role: MemberRole,
    pid: Option<u32>,
    child: Option<Child>,
    exit: Option<ExitRecord>,
}

impl Member {
    fn into_result(self) -> MemberResult {
        MemberResult {
            label: self.label,
            role: self.role,
            pid: self.pid,
            exit: self.exit.unwrap_or(ExitRecord::WaitFailed {
                reason: "member was never waited for".to_string(),
            }),
        }
    }
}

/// Launches and drains benchmark runs inside one log directory.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    log_dir: PathBuf,
    space: Option<ResourceIdSpace>,
    options: RunOptions,
}

impl RunCoordinator {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            space: None,
            options: RunOptions::default(),
        }
    }

    /// Hand workers resource ids from the space the server was sized with.
    pub fn with_resource_space(mut self, space: ResourceIdSpace) -> Self {
        self.space = Some(space);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Launch the coordinator and `num_cores` workers, then wait for all.
    ///
    /// `build_worker` is called once per core, in core order.
    pub async fn run<F>(
        &self,
        num_cores: u32,
        mut build_worker: F,
        coordinator: LaunchSpec,
    ) -> Result<RunResult, RunError>
    where
        F: FnMut(&WorkerSlot) -> LaunchSpec,
    {
        let slots = self.worker_slots(num_cores)?;

        std::fs::create_dir_all(&self.log_dir).map_err(|e| RunError::LogDir {
            path: self.log_dir.clone(),
            source: e,
        })?;

        let started = Instant::now();
        let mut members = Vec::with_capacity(slots.len() + 1);

        let child = self
            .spawn(&coordinator)?
            .map_err(|source| RunError::SpawnFailed {
                label: coordinator.label.clone(),
                program: coordinator.command.program_name(),
                source,
            })?;
        members.push(Member {
            label: coordinator.label.clone(),
            role: MemberRole::Coordinator,
            pid: child.id(),
            child: Some(child),
            exit: None,
        });

        for slot in &slots {
            let spec = build_worker(slot);
            let role = MemberRole::Worker {
                core: slot.core.value(),
            };

            // A worker whose log cannot be created counts as a failed launch.
            let spawned = self.spawn(&spec).unwrap_or_else(|e| Err(std::io::Error::other(e)));
            match spawned {
                Ok(child) => {
                    let pid = child.id();
                    if self.options.pin_affinity {
                        self.pin(pid, slot.core);
                    }
                    tracing::debug!(label = %spec.label, pid = ?pid, core = slot.core.value(), "Worker launched");
                    members.push(Member {
                        label: spec.label,
                        role,
                        pid,
                        child: Some(child),
                        exit: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(label = %spec.label, error = %e, "Worker failed to launch");
                    members.push(Member {
                        label: spec.label,
                        role,
                        pid: None,
                        child: None,
                        exit: Some(ExitRecord::SpawnFailed {
                            reason: e.to_string(),
                        }),
                    });
                }
            }
        }

        tracing::info!(
            num_cores = num_cores,
            launched = members.iter().filter(|m| m.child.is_some()).count(),
            "Run launched"
        );

        if self.options.fail_fast {
            drain_fail_fast(&mut members).await;
        } else {
            drain_in_order(&mut members).await;
        }

        let result = RunResult {
            num_cores,
            elapsed_ms: started.elapsed().as_millis() as u64,
            members: members.into_iter().map(Member::into_result).collect(),
        };

        if result.success() {
            tracing::info!(num_cores = num_cores, elapsed_ms = result.elapsed_ms, "Run succeeded");
        } else {
            tracing::warn!(
                num_cores = num_cores,
                failed = result.failures().count(),
                "Run failed"
            );
        }

        Ok(result)
    }

    fn worker_slots(&self, num_cores: u32) -> Result<Vec<WorkerSlot>, RunError> {
        if num_cores == 0 {
            return Err(RunError::NoCores);
        }
        if let Some(space) = &self.space {
            if space.num_apps() < num_cores {
                return Err(RunError::NotEnoughSlots {
                    requested: num_cores,
                    available: space.num_apps(),
                });
            }
        }

        (0..num_cores)
            .map(|c| {
                let core = CoreId::new(c).map_err(|_| RunError::CoreOutOfRange { core: c })?;
                let resource_ids = self.space.as_ref().and_then(|s| s.slot_key_list(c));
                Ok(WorkerSlot { core, resource_ids })
            })
            .collect()
    }

    /// Outer error: the log file could not be created. Inner: spawn failed.
    fn spawn(&self, spec: &LaunchSpec) -> Result<std::io::Result<Child>, RunError> {
        let log_path = self.log_dir.join(format!("{}.log", spec.label));
        let log = File::create(&log_path).map_err(|e| RunError::LogDir {
            path: log_path.clone(),
            source: e,
        })?;

        let mut cmd = spec.command.to_command();
        cmd.stdout(Stdio::from(log)).kill_on_drop(true);
        Ok(cmd.spawn())
    }

    fn pin(&self, pid: Option<u32>, core: CoreId) {
        let Some(pid) = pid.and_then(|p| ProcessId::new(p).ok()) else {
            return;
        };
        if let Err(e) = pin_to_core(pid, core) {
            tracing::warn!(pid = pid.value(), core = core.value(), error = %e, "Could not pin worker");
        }
    }
}

/// Wait on each member in launch order. Failures are recorded, never acted on.
async fn drain_in_order(members: &mut [Member]) {
    for member in members.iter_mut() {
        let Some(child) = member.child.as_mut() else {
            continue;
        };
        let exit = match child.wait().await {
            Ok(status) => ExitRecord::from_status(status),
            Err(e) => ExitRecord::WaitFailed {
                reason: e.to_string(),
            },
        };
        record(member, exit);
    }
}

/// Poll all members; on the first failure kill everything still running,
/// then keep polling until every member is accounted for.
async fn drain_fail_fast(members: &mut [Member]) {
    let mut cancelled = members
        .iter()
        .any(|m| m.exit.as_ref().is_some_and(|e| *e != ExitRecord::Exited { code: 0 }));
    if cancelled {
        cancel_remaining(members);
    }

    loop {
        let mut pending = 0;
        for member in members.iter_mut() {
            if member.exit.is_some() {
                continue;
            }
            let Some(child) = member.child.as_mut() else {
                continue;
            };
            let exit = match child.try_wait() {
                Ok(Some(status)) => ExitRecord::from_status(status),
                Ok(None) => {
                    pending += 1;
                    continue;
                }
                Err(e) => ExitRecord::WaitFailed {
                    reason: e.to_string(),
                },
            };
            cancelled |= exit != ExitRecord::Exited { code: 0 };
            record(member, exit);
        }

        if pending == 0 {
            break;
        }
        if cancelled {
            cancel_remaining(members);
        }
        tokio::time::sleep(FAIL_FAST_POLL).await;
    }
}

fn cancel_remaining(members: &mut [Member]) {
    for member in members.iter_mut().filter(|m| m.exit.is_none()) {
        if let Some(child) = member.child.as_mut() {
            if child.start_kill().is_ok() {
                tracing::debug!(label = %member.label, "Cancelled sibling after failure");
            }
        }
    }
}

fn record(member: &mut Member, exit: ExitRecord) {
    match &exit {
        ExitRecord::Exited { code: 0 } => {
            tracing::debug!(label = %member.label, "Member exited cleanly");
        }
        other => {
            tracing::warn!(label = %member.label, exit = ?other, "Member exited unexpectedly");
        }
    }
    member.exit = Some(exit);
}
