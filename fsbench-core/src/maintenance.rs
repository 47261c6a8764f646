// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Best-effort host cleanup between runs.
//!
//! Kills leftover benchmark processes, resets the storage device, flushes
//! and drops the page cache, and trims SSDs. Every step is idempotent and
//! none of them is fatal: failures are logged and reported back.

use std::process::Stdio;
use std::time::Duration;

use crate::invocation::CommandSpec;

/// Kernel knob for dropping page cache, dentries and inodes.
const DROP_CACHES_PATH: &str = "/proc/sys/vm/drop_caches";

/// Which cleanup steps to perform.
#[derive(Debug, Clone, Default)]
pub struct MaintenancePlan {
    /// Process names passed to `killall`.
    pub kill_stragglers: Vec<String>,
    /// Command that wipes the device, e.g. an `mkfs` wrapper.
    pub reset_command: Option<CommandSpec>,
    pub sync: bool,
    pub drop_caches: bool,
    pub trim: bool,
    /// Pause after everything else, letting the device settle.
    pub settle: Duration,
}

/// Steps that did not complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub failed_steps: Vec<String>,
}

impl MaintenanceReport {
    pub fn is_clean(&self) -> bool {
        self.failed_steps.is_empty()
    }

    fn fail(&mut self, step: impl Into<String>, reason: impl std::fmt::Display) {
        let step = step.into();
        tracing::warn!(step = %step, reason = %reason, "Maintenance step failed");
        self.failed_steps.push(step);
    }
}

/// Run every enabled step in order.
pub async fn run_maintenance(plan: &MaintenancePlan) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    for name in &plan.kill_stragglers {
        // killall exits non-zero when nothing matched, which is the common case.
        if let Err(e) = quiet_status(&CommandSpec::new("killall").arg(name.clone())).await {
            report.fail(format!("killall {}", name), e);
        }
    }

    if let Some(reset) = &plan.reset_command {
        match quiet_status(reset).await {
            Ok(true) => tracing::info!(command = %reset, "Device reset"),
            Ok(false) => report.fail("reset", format!("'{}' exited non-zero", reset)),
            Err(e) => report.fail("reset", e),
        }
    }

    if plan.sync {
        match quiet_status(&CommandSpec::new("sync")).await {
            Ok(true) => {}
            Ok(false) => report.fail("sync", "sync exited non-zero"),
            Err(e) => report.fail("sync", e),
        }
    }

    if plan.drop_caches {
        for level in ["1\n", "2\n", "3\n"] {
            if let Err(e) = tokio::fs::write(DROP_CACHES_PATH, level).await {
                report.fail(format!("drop_caches {}", level.trim()), e);
                break;
            }
        }
    }

    if plan.trim {
        match quiet_status(&CommandSpec::new("fstrim").args(["-a", "-v"])).await {
            Ok(true) => {}
            Ok(false) => report.fail("fstrim", "fstrim exited non-zero"),
            Err(e) => report.fail("fstrim", e),
        }
    }

    if !plan.settle.is_zero() {
        tokio::time::sleep(plan.settle).await;
    }

    tracing::debug!(failed = report.failed_steps.len(), "Maintenance finished");
    report
}

/// Run a command to completion with its output discarded.
async fn quiet_status(spec: &CommandSpec) -> std::io::Result<bool> {
    let status = spec
        .to_command()
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_plan_is_clean() {
        let report = run_maintenance(&MaintenancePlan::default()).await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_reset_success() {
        let plan = MaintenancePlan {
            reset_command: Some(CommandSpec::new("true")),
            ..Default::default()
        };
        assert!(run_maintenance(&plan).await.is_clean());
    }

    #[tokio::test]
    async fn test_reset_failure_is_reported_not_fatal() {
        let plan = MaintenancePlan {
            reset_command: Some(CommandSpec::new("false")),
            sync: true,
            ..Default::default()
        };
        let report = run_maintenance(&plan).await;
        assert_eq!(report.failed_steps, vec!["reset".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_reset_binary_is_reported() {
        let plan = MaintenancePlan {
            reset_command: Some(CommandSpec::new("/nonexistent/mkfs")),
            ..Default::default()
        };
        let report = run_maintenance(&plan).await;
        assert_eq!(report.failed_steps, vec!["reset".to_string()]);
    }
}
