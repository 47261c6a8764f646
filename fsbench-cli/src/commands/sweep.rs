// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fsbench sweep` command - Run the benchmark across core counts.
//!
//! Each step gets a fresh host (maintenance), a fresh server sized for the
//! step, an optional prep pass, then the coordinator plus one worker per
//! core. Prep can run under its own server instance, restarted with the
//! workload's settings before the measured run. The step's outcome lands in
//! `summary.json` next to the logs.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use serde::Serialize;

use fsbench_core::affinity::online_cpus;
use fsbench_core::config::ServerConfig;
use fsbench_core::maintenance::run_maintenance;
use fsbench_core::server_config::write_config_file;
use fsbench_core::{
    allocate, BenchmarkInvocation, CommandSpec, Config, ConfigLoader, LaunchSpec,
    ResourceIdSpace, RunCoordinator, RunResult, ServerController, ServerLaunchArgs, ServerLease,
    ShutdownOutcome,
};

/// One server instance within a step.
#[derive(Debug, Serialize)]
pub struct ServerPhase {
    /// `prep` or `run`.
    pub phase: String,
    pub argv: Vec<String>,
    pub shutdown: ShutdownOutcome,
    /// `None` without a post-shutdown command.
    pub post_shutdown_succeeded: Option<bool>,
}

/// Outcome of one sweep step, written as `summary.json`.
#[derive(Debug, Serialize)]
pub struct StepSummary {
    pub benchmark: String,
    pub workload: Option<String>,
    pub num_cores: u32,
    pub server_workers: u32,
    pub run_dir: PathBuf,
    pub resource_ids: Option<ResourceIdSpace>,
    pub maintenance_failures: Vec<String>,
    /// `None` when prep is disabled.
    pub prep_succeeded: Option<bool>,
    /// `None` when the run was skipped.
    pub run: Option<RunResult>,
    pub server_phases: Vec<ServerPhase>,
}

impl StepSummary {
    pub fn success(&self) -> bool {
        self.prep_succeeded != Some(false)
            && self.run.as_ref().is_some_and(RunResult::success)
            && self
                .server_phases
                .iter()
                .all(|p| p.post_shutdown_succeeded != Some(false))
    }
}

/// One point of the sweep.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub num_cores: u32,
    /// Set when server workers are swept independently of the core count.
    pub server_workers: Option<u32>,
    pub workload: Option<&'a str>,
}

impl Step<'_> {
    fn workers(&self) -> u32 {
        self.server_workers.unwrap_or(self.num_cores)
    }
}

pub async fn execute(
    config_path: &str,
    cores: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting sweep");

    // Load and validate configuration - fail fast on invalid config
    let config = ConfigLoader::load_file(config_path)?;

    let cpus = num_cpus::get();
    if config.sweep.max_cores as usize > cpus {
        tracing::warn!(
            max_cores = config.sweep.max_cores,
            cpus = cpus,
            "Sweep uses more cores than this host has"
        );
    }

    let online = online_cpus();
    if !online.contains(&config.coordinator.pin_core.index()) {
        tracing::warn!(
            core = config.coordinator.pin_core.value(),
            "Coordinator core is not online"
        );
    }

    let summaries = run_sweep(&config, cores).await?;

    println!();
    let failed: Vec<_> = summaries.iter().filter(|s| !s.success()).collect();
    if failed.is_empty() {
        println!("✓ {} step(s) succeeded", summaries.len());
        Ok(())
    } else {
        for summary in &failed {
            println!("✗ {}", summary.run_dir.display());
        }
        Err(format!("{} of {} step(s) failed", failed.len(), summaries.len()).into())
    }
}

/// Drive every step of the sweep while holding the server slot.
pub async fn run_sweep(
    config: &Config,
    cores: Option<u32>,
) -> Result<Vec<StepSummary>, Box<dyn std::error::Error>> {
    let (min_cores, max_cores) = match cores {
        Some(n) => (n, n),
        None => (config.sweep.min_cores, config.sweep.max_cores),
    };

    let lease = ServerLease::acquire(&config.lock_file)?;
    tracing::info!(lock = %lease.path().display(), "Acquired server slot");

    if let Some(server) = &config.server {
        write_config_file(&server.device_config, &server.device_settings)?;
        write_config_file(&server.server_config, &server.server_settings)?;
    }

    std::fs::create_dir_all(&config.log_root)?;

    let mut summaries = Vec::new();
    'sweep: for server_workers in config.sweep.worker_axis() {
        for num_cores in min_cores..=max_cores {
            for workload in config.benchmark.workload_list() {
                let step = Step {
                    num_cores,
                    server_workers,
                    workload,
                };
                let summary = run_step(config, &lease, step).await?;

                if summary.success() {
                    println!("✓ {} ({} cores)", summary.run_dir.display(), num_cores);
                } else {
                    println!("✗ {} ({} cores)", summary.run_dir.display(), num_cores);
                }

                let stop = !summary.success() && !config.sweep.continue_on_failure;
                summaries.push(summary);
                if stop {
                    tracing::warn!(num_cores = num_cores, "Stopping sweep after failed step");
                    break 'sweep;
                }
            }
        }
    }

    Ok(summaries)
}

/// `<name>[-<workload>]_ncpu-<n>`, plus `_nw-<w>` when server workers are swept.
pub fn run_dir_name(benchmark: &str, step: &Step<'_>) -> String {
    let mut name = match step.workload {
        Some(workload) => format!("{}-{}_ncpu-{}", benchmark, workload, step.num_cores),
        None => format!("{}_ncpu-{}", benchmark, step.num_cores),
    };
    if let Some(workers) = step.server_workers {
        name.push_str(&format!("_nw-{}", workers));
    }
    name
}

async fn run_step(
    config: &Config,
    lease: &ServerLease,
    step: Step<'_>,
) -> Result<StepSummary, Box<dyn std::error::Error>> {
    let run_dir = config
        .log_root
        .join(run_dir_name(&config.benchmark.name, &step));
    std::fs::create_dir_all(&run_dir)?;

    tracing::info!(
        num_cores = step.num_cores,
        server_workers = step.workers(),
        workload = step.workload.unwrap_or("-"),
        run_dir = %run_dir.display(),
        "Starting step"
    );

    let maintenance = run_maintenance(&config.maintenance).await;
    let bench = config.benchmark.invocation(step.workload);

    let space = match &config.server {
        Some(_) => Some(allocate(
            step.workers(),
            config.allocation.app_slots(step.num_cores),
            config.allocation.core_base,
            config.allocation.shm_stride,
        )?),
        None => None,
    };

    let mut summary = StepSummary {
        benchmark: config.benchmark.name.clone(),
        workload: step.workload.map(str::to_string),
        num_cores: step.num_cores,
        server_workers: step.workers(),
        run_dir: run_dir.clone(),
        resource_ids: space.clone(),
        maintenance_failures: maintenance.failed_steps,
        prep_succeeded: None,
        run: None,
        server_phases: Vec::new(),
    };

    // Fill under its own server, then restart for the measured phase.
    let separate_prep = config.benchmark.prep && config.benchmark.separate_prep_server;
    if let (true, Some(server), Some(space)) = (separate_prep, &config.server, &space) {
        let live = start_server(server, lease, space, "prep", Some("prep"), &run_dir).await?;
        let prepped = run_prep(&bench, &run_dir).await;
        let phase = stop_server(server, live, &run_dir).await?;

        let hook_ok = phase.post_shutdown_succeeded != Some(false);
        summary.prep_succeeded = Some(prepped);
        summary.server_phases.push(phase);
        if !prepped || !hook_ok {
            write_summary(&summary)?;
            return Ok(summary);
        }
    }

    let live = match (&config.server, &space) {
        (Some(server), Some(space)) => {
            Some(start_server(server, lease, space, "run", step.workload, &run_dir).await?)
        }
        _ => None,
    };

    if config.benchmark.prep && summary.prep_succeeded.is_none() {
        summary.prep_succeeded = Some(run_prep(&bench, &run_dir).await);
    }

    let run = if summary.prep_succeeded == Some(false) {
        None
    } else {
        let mut coordinator =
            RunCoordinator::new(&run_dir).with_options(config.sweep.run_options);
        if let Some(space) = &space {
            coordinator = coordinator.with_resource_space(space.clone());
        }
        Some(
            coordinator
                .run(
                    step.num_cores,
                    |slot| LaunchSpec::new(format!("core-{}", slot.core), bench.bench(slot)),
                    LaunchSpec::new("coordinator", config.coordinator.command(step.num_cores)),
                )
                .await,
        )
    };

    // The server goes down even when the run could not be launched.
    if let (Some(server), Some(live)) = (&config.server, live) {
        summary.server_phases.push(stop_server(server, live, &run_dir).await?);
    }
    summary.run = run.transpose()?;

    write_summary(&summary)?;
    Ok(summary)
}

/// A started server and the phase it serves.
struct LiveServer {
    phase: &'static str,
    controller: ServerController,
}

/// Start a server for `phase`, logging to `server.log` (`server-prep.log` for prep).
///
/// `overrides` names the `phase_settings` entry to apply, if any.
async fn start_server(
    server: &ServerConfig,
    lease: &ServerLease,
    space: &ResourceIdSpace,
    phase: &'static str,
    overrides: Option<&str>,
    run_dir: &Path,
) -> Result<LiveServer, Box<dyn std::error::Error>> {
    let mut server_config = server.server_config.clone();
    if let Some((path, settings)) = overrides.and_then(|key| server.phase_config(key)) {
        write_config_file(&path, &settings)?;
        server_config = path;
    }

    let args = ServerLaunchArgs {
        space: space.clone(),
        device_config: server.device_config.clone(),
        server_config,
    };
    let log = match phase {
        "run" => run_dir.join("server.log"),
        other => run_dir.join(format!("server-{}.log", other)),
    };

    let mut controller = ServerController::new(server.settings.clone());
    controller.start(lease, &args, Some(&log)).await?;
    Ok(LiveServer { phase, controller })
}

/// Shut the server down, then run the post-shutdown command if configured.
async fn stop_server(
    server: &ServerConfig,
    mut live: LiveServer,
    run_dir: &Path,
) -> Result<ServerPhase, Box<dyn std::error::Error>> {
    let argv = live
        .controller
        .process()
        .map(|p| p.argv().to_vec())
        .unwrap_or_default();
    let shutdown = live.controller.shutdown().await?;

    let post_shutdown_succeeded = match &server.post_shutdown {
        Some(hook) => {
            let log = run_dir.join(format!("post-shutdown-{}.log", live.phase));
            Some(run_logged(hook, &log, "post-shutdown").await)
        }
        None => None,
    };

    Ok(ServerPhase {
        phase: live.phase.to_string(),
        argv,
        shutdown,
        post_shutdown_succeeded,
    })
}

/// Run `<program> --prep <target>` to completion with stdout in `prep.log`.
async fn run_prep(bench: &BenchmarkInvocation, run_dir: &Path) -> bool {
    run_logged(&bench.prep(), &run_dir.join("prep.log"), "prep").await
}

/// Run a command to completion with stdout in `log`.
///
/// A command that cannot be launched counts as a failure.
async fn run_logged(spec: &CommandSpec, log: &Path, what: &str) -> bool {
    tracing::debug!(command = %spec, what = what, "Running command");

    match spawn_logged(spec, log).await {
        Ok(status) if status.success() => true,
        Ok(status) => {
            tracing::warn!(what = what, code = ?status.code(), "Command failed");
            false
        }
        Err(e) => {
            tracing::warn!(what = what, command = %spec, error = %e, "Command could not run");
            false
        }
    }
}

async fn spawn_logged(spec: &CommandSpec, log: &Path) -> std::io::Result<ExitStatus> {
    let log = File::create(log)?;
    spec.to_command()
        .stdout(Stdio::from(log))
        .kill_on_drop(true)
        .status()
        .await
}

fn write_summary(summary: &StepSummary) -> Result<(), Box<dyn std::error::Error>> {
    let path = summary.run_dir.join("summary.json");
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json)?;
    tracing::debug!(path = %path.display(), "Wrote step summary");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_dir_name() {
        let step = Step {
            num_cores: 4,
            server_workers: None,
            workload: None,
        };
        assert_eq!(run_dir_name("smallfile", &step), "smallfile_ncpu-4");

        let step = Step {
            num_cores: 2,
            server_workers: None,
            workload: Some("create"),
        };
        assert_eq!(run_dir_name("largefile", &step), "largefile-create_ncpu-2");

        let step = Step {
            num_cores: 3,
            server_workers: Some(1),
            workload: Some("varmail"),
        };
        assert_eq!(
            run_dir_name("filebench", &step),
            "filebench-varmail_ncpu-3_nw-1"
        );
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn sweep_config(dir: &Path, worker_body: &str, continue_on_failure: bool) -> Config {
        ConfigLoader::load_string(&sweep_yaml(dir, worker_body, continue_on_failure)).unwrap()
    }

    fn sweep_yaml(dir: &Path, worker_body: &str, continue_on_failure: bool) -> String {
        let server = write_script(
            dir,
            "server.sh",
            "#!/bin/sh\ntouch \"$READY_FILE_NAME\"\nwhile [ ! -e \"$4\" ]; do sleep 0.05; done\n",
        );
        let coordinator = write_script(dir, "coordinator.sh", "#!/bin/sh\nexit 0\n");
        let worker = write_script(dir, "worker.sh", worker_body);

        format!(
            r#"
log_root: {root}/logs
lock_file: {root}/fsbench.lock
server:
  program: {server}
  process_name: server.sh
  ready_sentinel: {root}/ready
  exit_sentinel: {root}/exit
  device_config: {root}/spdk.conf
  server_config: {root}/fsp.conf
  poll_interval_ms: 20
  shutdown_grace_ms: 2000
  device_settings:
    dev_name: spdkSSD
coordinator:
  program: {coordinator}
benchmark:
  name: smallfile
  program: {worker}
  target: {root}
sweep:
  min_cores: 1
  max_cores: 2
  continue_on_failure: {continue_on_failure}
maintenance:
  sync: false
  drop_caches: false
  trim: false
  settle_ms: 0
"#,
            root = dir.display(),
            server = server.display(),
            coordinator = coordinator.display(),
            worker = worker.display(),
            continue_on_failure = continue_on_failure,
        )
    }

    #[tokio::test]
    async fn test_sweep_writes_logs_and_summaries() {
        let dir = TempDir::new().unwrap();
        let config = sweep_config(dir.path(), "#!/bin/sh\necho \"$1 $2 $3\"\nexit 0\n", false);

        let summaries = run_sweep(&config, None).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(StepSummary::success));

        let step = dir.path().join("logs").join("smallfile_ncpu-2");
        for file in ["server.log", "prep.log", "coordinator.log", "core-0.log", "core-1.log", "summary.json"] {
            assert!(step.join(file).exists(), "missing {}", file);
        }
        let prep = std::fs::read_to_string(step.join("prep.log")).unwrap();
        assert!(prep.starts_with("--prep"));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(step.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["num_cores"], 2);
        assert_eq!(summary["server_workers"], 2);
        assert_eq!(summary["run"]["members"].as_array().unwrap().len(), 3);

        let argv = summary["server_phases"][0]["argv"].as_array().unwrap();
        assert_eq!(argv.len(), 7);
        assert_eq!(argv[0], "2");
        assert_eq!(argv[6], dir.path().join("fsp.conf").display().to_string());

        let device = std::fs::read_to_string(dir.path().join("spdk.conf")).unwrap();
        assert_eq!(device, "dev_name = \"spdkSSD\";\n");
    }

    #[tokio::test]
    async fn test_sweep_stops_after_failed_step() {
        let dir = TempDir::new().unwrap();
        // Prep passes; every bench worker fails.
        let worker = "#!/bin/sh\n[ \"$1\" = \"--prep\" ] && exit 0\nexit 1\n";
        let config = sweep_config(dir.path(), worker, false);

        let summaries = run_sweep(&config, None).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(!summaries[0].success());
        assert_eq!(summaries[0].server_phases.len(), 1);
        assert!(matches!(
            summaries[0].server_phases[0].shutdown,
            ShutdownOutcome::Clean { .. }
        ));
    }

    #[tokio::test]
    async fn test_sweep_continues_when_configured() {
        let dir = TempDir::new().unwrap();
        let worker = "#!/bin/sh\n[ \"$1\" = \"--prep\" ] && exit 0\nexit 1\n";
        let config = sweep_config(dir.path(), worker, true);

        let summaries = run_sweep(&config, None).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| !s.success()));
    }

    #[tokio::test]
    async fn test_failed_prep_skips_run() {
        let dir = TempDir::new().unwrap();
        let config = sweep_config(dir.path(), "#!/bin/sh\nexit 2\n", false);

        let summaries = run_sweep(&config, Some(1)).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].prep_succeeded, Some(false));
        assert!(summaries[0].run.is_none());
    }

    #[tokio::test]
    async fn test_unlaunchable_prep_still_shuts_server_down() {
        let dir = TempDir::new().unwrap();
        let mut config = sweep_config(dir.path(), "#!/bin/sh\nexit 0\n", false);
        config.benchmark.program = PathBuf::from("/nonexistent/fsbench-worker");

        let summaries = run_sweep(&config, Some(1)).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].prep_succeeded, Some(false));
        assert!(summaries[0].run.is_none());
        assert!(matches!(
            summaries[0].server_phases[0].shutdown,
            ShutdownOutcome::Clean { .. }
        ));

        assert!(dir.path().join("exit").exists());
        let step = dir.path().join("logs").join("smallfile_ncpu-1");
        assert!(step.join("summary.json").exists());
    }

    fn with_prep_server(dir: &Path, worker_body: &str, hook_body: &str) -> Config {
        let hook = write_script(dir, "checkpoint.sh", hook_body);
        let yaml = sweep_yaml(dir, worker_body, false)
            .replace(
                "  device_settings:\n",
                &format!(
                    "  phase_settings:\n    prep:\n      splitPolicyNum: \"0\"\n  post_shutdown_command: [{}]\n  device_settings:\n",
                    hook.display()
                ),
            )
            .replace(
                "  target: ",
                "  separate_prep_server: true\n  target: ",
            );
        ConfigLoader::load_string(&yaml).unwrap()
    }

    #[tokio::test]
    async fn test_separate_prep_server_restarts_with_run_config() {
        let dir = TempDir::new().unwrap();
        let hook = format!(
            "#!/bin/sh\necho done >> {}\nexit 0\n",
            dir.path().join("checkpoints").display()
        );
        let config = with_prep_server(dir.path(), "#!/bin/sh\nexit 0\n", &hook);

        let summaries = run_sweep(&config, Some(1)).await.unwrap();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert!(summary.success());
        assert_eq!(summary.prep_succeeded, Some(true));

        let phases: Vec<_> = summary.server_phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(phases, ["prep", "run"]);
        assert!(summary
            .server_phases
            .iter()
            .all(|p| p.post_shutdown_succeeded == Some(true)));

        let prep_conf = dir.path().join("fsp-prep.conf");
        assert_eq!(
            summary.server_phases[0].argv[6],
            prep_conf.display().to_string()
        );
        assert_eq!(
            summary.server_phases[1].argv[6],
            dir.path().join("fsp.conf").display().to_string()
        );
        let rendered = std::fs::read_to_string(&prep_conf).unwrap();
        assert!(rendered.contains("splitPolicyNum = \"0\";"));

        let step = dir.path().join("logs").join("smallfile_ncpu-1");
        for file in ["server-prep.log", "server.log", "post-shutdown-prep.log", "post-shutdown-run.log"] {
            assert!(step.join(file).exists(), "missing {}", file);
        }
        let checkpoints = std::fs::read_to_string(dir.path().join("checkpoints")).unwrap();
        assert_eq!(checkpoints.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_failed_post_shutdown_fails_step() {
        let dir = TempDir::new().unwrap();
        let config = with_prep_server(dir.path(), "#!/bin/sh\nexit 0\n", "#!/bin/sh\nexit 1\n");

        let summaries = run_sweep(&config, Some(1)).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(!summaries[0].success());
        assert_eq!(summaries[0].server_phases.len(), 1);
        assert_eq!(summaries[0].server_phases[0].post_shutdown_succeeded, Some(false));
        assert!(summaries[0].run.is_none());
    }

    #[tokio::test]
    async fn test_server_workers_swept_independently() {
        let dir = TempDir::new().unwrap();
        let yaml = sweep_yaml(dir.path(), "#!/bin/sh\nexit 0\n", false).replace(
            "  max_cores: 2\n",
            "  max_cores: 2\n  server_workers: [1, 2]\n",
        );
        let config = ConfigLoader::load_string(&yaml).unwrap();

        let summaries = run_sweep(&config, Some(2)).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(StepSummary::success));

        for (summary, workers) in summaries.iter().zip([1u32, 2]) {
            assert_eq!(summary.num_cores, 2);
            assert_eq!(summary.server_workers, workers);
            assert_eq!(
                summary.run_dir,
                dir.path()
                    .join("logs")
                    .join(format!("smallfile_ncpu-2_nw-{}", workers))
            );
            let space = summary.resource_ids.as_ref().unwrap();
            assert_eq!(space.num_workers(), workers);
            assert_eq!(space.num_apps(), 2);
        }
    }
}
