// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Command construction for the server, the coordinator and the workers.
//!
//! Every external program is described by a `CommandSpec` first and only
//! turned into a process at launch time, so argv layouts can be asserted
//! in tests without spawning anything.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;

use crate::alloc::{join_ids, ResourceIdSpace};
use crate::types::CoreId;

/// Environment variable through which the server learns its readiness path.
pub const READY_FILE_ENV: &str = "READY_FILE_NAME";

/// Program, argv and extra environment for one external process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build a tokio command with stdin closed and stderr inherited.
    /// Stdout is left for the caller to redirect.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A command plus the label its log file is named after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub label: String,
    pub command: CommandSpec,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

/// Everything the server needs on its command line besides the exit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLaunchArgs {
    pub space: ResourceIdSpace,
    pub device_config: PathBuf,
    pub server_config: PathBuf,
}

impl ServerLaunchArgs {
    /// Positional argv, order-sensitive:
    /// workers, apps, offsets, exit sentinel, device config, affinities, server config.
    pub fn argv(&self, exit_sentinel: &Path) -> Vec<String> {
        vec![
            self.space.num_workers().to_string(),
            self.space.num_apps().to_string(),
            self.space.offsets_arg(),
            exit_sentinel.display().to_string(),
            self.device_config.display().to_string(),
            self.space.affinity_arg(),
            self.server_config.display().to_string(),
        ]
    }
}

/// Identity handed to the command builder for one benchmark worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    pub core: CoreId,
    pub resource_ids: Option<Vec<u32>>,
}

/// Benchmark mode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchMode {
    Prep,
    Bench,
}

impl BenchMode {
    pub const fn flag(&self) -> &'static str {
        match self {
            Self::Prep => "--prep",
            Self::Bench => "--bench",
        }
    }
}

/// How to invoke the benchmark workload generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkInvocation {
    pub program: PathBuf,
    pub workload: Option<String>,
    pub extra_args: Vec<String>,
    pub target: PathBuf,
    pub pass_resource_ids: bool,
}

impl BenchmarkInvocation {
    /// `<program> --prep <target>`: one-off data preparation before a run.
    pub fn prep(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg(BenchMode::Prep.flag())
            .arg(self.target.display().to_string())
    }

    /// `<program> --bench [workload] [extra...] -c <core> [-r <ids>] <target>`.
    pub fn bench(&self, slot: &WorkerSlot) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.program).arg(BenchMode::Bench.flag());
        if let Some(workload) = &self.workload {
            cmd = cmd.arg(workload.clone());
        }
        cmd = cmd
            .args(self.extra_args.iter().cloned())
            .arg("-c")
            .arg(slot.core.to_string());
        if self.pass_resource_ids {
            if let Some(ids) = &slot.resource_ids {
                cmd = cmd.arg("-r").arg(join_ids(ids));
            }
        }
        cmd.arg(self.target.display().to_string())
    }
}

/// How to invoke the run barrier process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorInvocation {
    pub program: PathBuf,
    pub pin_core: CoreId,
}

impl CoordinatorInvocation {
    /// `<program> -n <expected workers> -c <pin core>`.
    pub fn command(&self, expected_workers: u32) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("-n")
            .arg(expected_workers.to_string())
            .arg("-c")
            .arg(self.pin_core.to_string())
    }
}
