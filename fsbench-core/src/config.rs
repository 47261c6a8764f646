// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML driver configuration with strict validation.
//!
//! Everything a sweep needs is checked here, before any process is
//! launched: program paths, core ids, sentinel paths and, when a server is
//! configured, that the resource id space for the largest sweep step can be
//! allocated without collisions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::alloc::allocate;
use crate::error::{BenchError, BenchResult, HardValidationError};
use crate::invocation::{BenchmarkInvocation, CommandSpec, CoordinatorInvocation};
use crate::maintenance::MaintenancePlan;
use crate::run::RunOptions;
use crate::server::{ServerSettings, DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_GRACE};
use crate::server_config;
use crate::types::{CoreId, ProcessName, MAX_CORE_ID};

/// Raw server section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawServerConfig {
    program: String,
    process_name: ProcessName,
    #[serde(default = "default_ready_sentinel")]
    ready_sentinel: PathBuf,
    #[serde(default = "default_exit_sentinel")]
    exit_sentinel: PathBuf,
    #[serde(default = "default_device_config")]
    device_config: PathBuf,
    #[serde(default = "default_server_config")]
    server_config: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    shutdown_grace_ms: u64,
    #[serde(default)]
    startup_timeout_ms: Option<u64>,
    #[serde(default)]
    device_settings: BTreeMap<String, String>,
    #[serde(default)]
    server_settings: BTreeMap<String, String>,
    #[serde(default)]
    phase_settings: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    post_shutdown_command: Vec<String>,
}

fn default_ready_sentinel() -> PathBuf {
    PathBuf::from("/tmp/cfs_ready")
}

fn default_exit_sentinel() -> PathBuf {
    PathBuf::from("/tmp/cfs_exit")
}

fn default_device_config() -> PathBuf {
    PathBuf::from("/tmp/spdk.conf")
}

fn default_server_config() -> PathBuf {
    PathBuf::from("/tmp/fsp.conf")
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE.as_millis() as u64
}

/// Raw allocation section.
#[derive(Debug, Deserialize)]
struct RawAllocationConfig {
    #[serde(default)]
    core_base: u32,
    #[serde(default = "default_shm_stride")]
    shm_stride: u32,
    #[serde(default)]
    extra_app_slots: u32,
}

fn default_shm_stride() -> u32 {
    10
}

impl Default for RawAllocationConfig {
    fn default() -> Self {
        Self {
            core_base: 0,
            shm_stride: default_shm_stride(),
            extra_app_slots: 0,
        }
    }
}

/// Raw coordinator section.
#[derive(Debug, Deserialize)]
struct RawCoordinatorConfig {
    program: String,
    #[serde(default = "default_coordinator_core")]
    pin_core: u32,
}

fn default_coordinator_core() -> u32 {
    21
}

/// Raw benchmark section.
#[derive(Debug, Deserialize)]
struct RawBenchmarkConfig {
    name: String,
    program: String,
    #[serde(default)]
    workloads: Vec<String>,
    #[serde(default)]
    extra_args: Vec<String>,
    target: PathBuf,
    #[serde(default = "default_true")]
    prep: bool,
    #[serde(default)]
    pass_resource_ids: bool,
    #[serde(default)]
    separate_prep_server: bool,
}

fn default_true() -> bool {
    true
}

/// Raw sweep section.
#[derive(Debug, Deserialize)]
struct RawSweepConfig {
    #[serde(default = "default_min_cores")]
    min_cores: u32,
    max_cores: u32,
    #[serde(default)]
    continue_on_failure: bool,
    #[serde(default)]
    fail_fast: bool,
    #[serde(default)]
    pin_affinity: bool,
    #[serde(default)]
    server_workers: Vec<u32>,
}

fn default_min_cores() -> u32 {
    1
}

/// Raw maintenance section.
#[derive(Debug, Deserialize)]
struct RawMaintenanceConfig {
    #[serde(default)]
    kill_stragglers: Vec<String>,
    #[serde(default)]
    reset_command: Vec<String>,
    #[serde(default = "default_true")]
    sync: bool,
    #[serde(default = "default_true")]
    drop_caches: bool,
    #[serde(default = "default_true")]
    trim: bool,
    #[serde(default = "default_settle_ms")]
    settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

impl Default for RawMaintenanceConfig {
    fn default() -> Self {
        Self {
            kill_stragglers: Vec::new(),
            reset_command: Vec::new(),
            sync: true,
            drop_caches: true,
            trim: true,
            settle_ms: default_settle_ms(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    log_root: PathBuf,
    #[serde(default = "default_lock_file")]
    lock_file: PathBuf,
    #[serde(default)]
    server: Option<RawServerConfig>,
    #[serde(default)]
    allocation: RawAllocationConfig,
    coordinator: RawCoordinatorConfig,
    benchmark: RawBenchmarkConfig,
    sweep: RawSweepConfig,
    #[serde(default)]
    maintenance: RawMaintenanceConfig,
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/tmp/fsbench.lock")
}

/// Validated server section.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub settings: ServerSettings,
    pub device_config: PathBuf,
    pub server_config: PathBuf,
    pub device_settings: BTreeMap<String, String>,
    pub server_settings: BTreeMap<String, String>,
    /// Overrides on top of `server_settings`, keyed by phase
    /// (`prep` or a workload name).
    pub phase_settings: BTreeMap<String, BTreeMap<String, String>>,
    /// Run after every server shutdown, e.g. an offline journal checkpointer.
    pub post_shutdown: Option<CommandSpec>,
}

impl ServerConfig {
    /// Config file and merged settings for a phase with overrides.
    ///
    /// `None` means the phase uses the base `server_config` file as is.
    /// Override files sit next to it as `<stem>-<phase>.conf`.
    pub fn phase_config(&self, phase: &str) -> Option<(PathBuf, BTreeMap<String, String>)> {
        let overrides = self.phase_settings.get(phase)?;

        let mut merged = self.server_settings.clone();
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let stem = self
            .server_config
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server".to_string());
        let path = self
            .server_config
            .with_file_name(format!("{}-{}.conf", stem, phase));

        Some((path, merged))
    }
}

/// Validated allocation section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationConfig {
    pub core_base: u32,
    pub shm_stride: u32,
    pub extra_app_slots: u32,
}

impl AllocationConfig {
    /// App slots a run on `num_cores` cores needs.
    pub fn app_slots(&self, num_cores: u32) -> u32 {
        num_cores.saturating_add(self.extra_app_slots)
    }
}

/// Validated benchmark section.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub name: String,
    pub program: PathBuf,
    pub workloads: Vec<String>,
    pub extra_args: Vec<String>,
    pub target: PathBuf,
    pub prep: bool,
    pub pass_resource_ids: bool,
    /// Prep under its own server instance, shut down before the run phase.
    pub separate_prep_server: bool,
}

impl BenchmarkConfig {
    /// Invocation for one workload (or the workload-less default).
    pub fn invocation(&self, workload: Option<&str>) -> BenchmarkInvocation {
        BenchmarkInvocation {
            program: self.program.clone(),
            workload: workload.map(str::to_string),
            extra_args: self.extra_args.clone(),
            target: self.target.clone(),
            pass_resource_ids: self.pass_resource_ids,
        }
    }

    /// Workloads to run at every sweep step; `[None]` when none are listed.
    pub fn workload_list(&self) -> Vec<Option<&str>> {
        if self.workloads.is_empty() {
            vec![None]
        } else {
            self.workloads.iter().map(|w| Some(w.as_str())).collect()
        }
    }
}

/// Validated sweep section.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub min_cores: u32,
    pub max_cores: u32,
    pub continue_on_failure: bool,
    pub run_options: RunOptions,
    /// Server worker counts swept independently of the core count.
    /// Empty ties the server worker count to the core count.
    pub server_workers: Vec<u32>,
}

impl SweepConfig {
    /// Outer sweep axis: `[None]` when server workers follow the core count.
    pub fn worker_axis(&self) -> Vec<Option<u32>> {
        if self.server_workers.is_empty() {
            vec![None]
        } else {
            self.server_workers.iter().copied().map(Some).collect()
        }
    }

    /// Largest server worker count any step uses.
    pub fn max_server_workers(&self) -> u32 {
        self.server_workers
            .iter()
            .copied()
            .max()
            .unwrap_or(self.max_cores)
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_root: PathBuf,
    pub lock_file: PathBuf,
    pub server: Option<ServerConfig>,
    pub allocation: AllocationConfig,
    pub coordinator: CoordinatorInvocation,
    pub benchmark: BenchmarkConfig,
    pub sweep: SweepConfig,
    pub maintenance: MaintenancePlan,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> BenchResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> BenchResult<Config> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> BenchResult<Config> {
        if raw.log_root.as_os_str().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "log_root",
                context: "root".to_string(),
            }
            .into());
        }

        let sweep = Self::validate_sweep(raw.sweep)?;
        let allocation = AllocationConfig {
            core_base: raw.allocation.core_base,
            shm_stride: raw.allocation.shm_stride,
            extra_app_slots: raw.allocation.extra_app_slots,
        };

        let server = match raw.server {
            Some(raw_server) => {
                let server = Self::validate_server(raw_server)?;
                // The largest step needs the largest space; smaller ones then fit too.
                allocate(
                    sweep.max_server_workers(),
                    allocation.app_slots(sweep.max_cores),
                    allocation.core_base,
                    allocation.shm_stride,
                )?;
                Some(server)
            }
            None => None,
        };

        let coordinator = CoordinatorInvocation {
            program: non_empty_program(raw.coordinator.program, "coordinator")?,
            pin_core: CoreId::new(raw.coordinator.pin_core)?,
        };

        let benchmark = Self::validate_benchmark(raw.benchmark)?;
        let maintenance = Self::validate_maintenance(raw.maintenance)?;

        Ok(Config {
            log_root: raw.log_root,
            lock_file: raw.lock_file,
            server,
            allocation,
            coordinator,
            benchmark,
            sweep,
            maintenance,
        })
    }

    fn validate_server(raw: RawServerConfig) -> BenchResult<ServerConfig> {
        let program = non_empty_program(raw.program, "server")?;

        if raw.poll_interval_ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "poll_interval_ms",
                value: "0".to_string(),
                reason: "Poll interval must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.shutdown_grace_ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shutdown_grace_ms",
                value: "0".to_string(),
                reason: "Grace period must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.startup_timeout_ms == Some(0) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "startup_timeout_ms",
                value: "0".to_string(),
                reason: "Omit the field to wait without a limit".to_string(),
            }
            .into());
        }

        if raw.ready_sentinel == raw.exit_sentinel {
            return Err(HardValidationError::InvalidFieldValue {
                field: "exit_sentinel",
                value: raw.exit_sentinel.display().to_string(),
                reason: "Readiness and exit sentinels must be different paths".to_string(),
            }
            .into());
        }

        server_config::validate("device_settings", &raw.device_settings)?;
        server_config::validate("server_settings", &raw.server_settings)?;
        for (phase, overrides) in &raw.phase_settings {
            if !is_dir_component(phase) {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "phase_settings",
                    value: phase.clone(),
                    reason: "Phase names are used in file names: [A-Za-z0-9_-] only"
                        .to_string(),
                }
                .into());
            }
            server_config::validate("phase_settings", overrides)?;
        }

        let post_shutdown = match raw.post_shutdown_command.split_first() {
            Some((program, args)) => Some(
                CommandSpec::new(non_empty_program(program.clone(), "post_shutdown_command")?)
                    .args(args.iter().cloned()),
            ),
            None => None,
        };

        Ok(ServerConfig {
            settings: ServerSettings {
                program,
                process_name: raw.process_name,
                ready_sentinel: raw.ready_sentinel,
                exit_sentinel: raw.exit_sentinel,
                poll_interval: Duration::from_millis(raw.poll_interval_ms),
                shutdown_grace: Duration::from_millis(raw.shutdown_grace_ms),
                startup_timeout: raw.startup_timeout_ms.map(Duration::from_millis),
            },
            device_config: raw.device_config,
            server_config: raw.server_config,
            device_settings: raw.device_settings,
            server_settings: raw.server_settings,
            phase_settings: raw.phase_settings,
            post_shutdown,
        })
    }

    fn validate_sweep(raw: RawSweepConfig) -> BenchResult<SweepConfig> {
        if raw.min_cores == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "min_cores",
                value: "0".to_string(),
                reason: "A run needs at least one core".to_string(),
            }
            .into());
        }

        if raw.max_cores < raw.min_cores {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_cores",
                value: raw.max_cores.to_string(),
                reason: format!("Must be at least min_cores ({})", raw.min_cores),
            }
            .into());
        }

        if raw.max_cores > MAX_CORE_ID + 1 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_cores",
                value: raw.max_cores.to_string(),
                reason: format!("Must not exceed {}", MAX_CORE_ID + 1),
            }
            .into());
        }

        if raw.server_workers.contains(&0) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "server_workers",
                value: "0".to_string(),
                reason: "A server needs at least one worker".to_string(),
            }
            .into());
        }

        Ok(SweepConfig {
            min_cores: raw.min_cores,
            max_cores: raw.max_cores,
            continue_on_failure: raw.continue_on_failure,
            run_options: RunOptions {
                fail_fast: raw.fail_fast,
                pin_affinity: raw.pin_affinity,
            },
            server_workers: raw.server_workers,
        })
    }

    fn validate_benchmark(raw: RawBenchmarkConfig) -> BenchResult<BenchmarkConfig> {
        if !is_dir_component(&raw.name) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: raw.name,
                reason: "Benchmark name is used in directory names: [A-Za-z0-9_-] only"
                    .to_string(),
            }
            .into());
        }

        if let Some(bad) = raw.workloads.iter().find(|w| !is_dir_component(w)) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "workloads",
                value: bad.clone(),
                reason: "Workload names are used in directory names: [A-Za-z0-9_-] only"
                    .to_string(),
            }
            .into());
        }

        if raw.target.as_os_str().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "target",
                context: "benchmark".to_string(),
            }
            .into());
        }

        Ok(BenchmarkConfig {
            name: raw.name,
            program: non_empty_program(raw.program, "benchmark")?,
            workloads: raw.workloads,
            extra_args: raw.extra_args,
            target: raw.target,
            prep: raw.prep,
            pass_resource_ids: raw.pass_resource_ids,
            separate_prep_server: raw.separate_prep_server,
        })
    }

    fn validate_maintenance(raw: RawMaintenanceConfig) -> BenchResult<MaintenancePlan> {
        if raw.kill_stragglers.iter().any(|n| n.is_empty()) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "kill_stragglers",
                value: "\"\"".to_string(),
                reason: "Process names cannot be empty".to_string(),
            }
            .into());
        }

        let reset_command = match raw.reset_command.split_first() {
            Some((program, args)) => Some(
                CommandSpec::new(non_empty_program(program.clone(), "reset_command")?)
                    .args(args.iter().cloned()),
            ),
            None => None,
        };

        Ok(MaintenancePlan {
            kill_stragglers: raw.kill_stragglers,
            reset_command,
            sync: raw.sync,
            drop_caches: raw.drop_caches,
            trim: raw.trim,
            settle: Duration::from_millis(raw.settle_ms),
        })
    }
}

/// Non-empty and limited to `[A-Za-z0-9_-]`, so it can be spliced into a path.
fn is_dir_component(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn non_empty_program(program: String, context: &'static str) -> Result<PathBuf, HardValidationError> {
    if program.trim().is_empty() {
        return Err(HardValidationError::EmptyProgram { context });
    }
    Ok(PathBuf::from(program))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
log_root: /tmp/fsbench-logs

server:
  program: /opt/ufs/fsMain
  process_name: fsMain
  shutdown_grace_ms: 15000
  device_settings:
    dev_name: spdkSSD
    core_mask: "0x2"
    shm_id: "9"
  server_settings:
    splitPolicyNum: "5"
    serverCorePolicyNo: "5"

allocation:
  shm_stride: 10

coordinator:
  program: /opt/ufs/cfs_bench_coordinator
  pin_core: 21

benchmark:
  name: largefile
  program: build/largefile
  workloads: [create, overwrite]
  target: /

sweep:
  max_cores: 10

maintenance:
  kill_stragglers: [largefile, cfs_bench_coordinator]
  reset_command: [/opt/ufs/mkfs, mkfs]
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        let server = config.server.as_ref().unwrap();
        assert_eq!(server.settings.process_name.as_str(), "fsMain");
        assert_eq!(server.device_settings.len(), 3);
        assert_eq!(config.coordinator.pin_core.value(), 21);
        assert_eq!(config.benchmark.workload_list(), vec![Some("create"), Some("overwrite")]);
        assert_eq!(config.sweep.max_cores, 10);
        assert_eq!(
            config.maintenance.reset_command.as_ref().unwrap().args,
            vec!["mkfs"]
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        let server = config.server.unwrap();
        assert_eq!(server.settings.ready_sentinel, PathBuf::from("/tmp/cfs_ready"));
        assert_eq!(server.settings.exit_sentinel, PathBuf::from("/tmp/cfs_exit"));
        assert_eq!(server.settings.poll_interval, Duration::from_millis(100));
        assert_eq!(server.settings.startup_timeout, None);
        assert_eq!(config.sweep.min_cores, 1);
        assert!(!config.sweep.continue_on_failure);
        assert!(!config.sweep.run_options.fail_fast);
        assert!(config.benchmark.prep);
        assert!(config.maintenance.drop_caches);
        assert_eq!(config.lock_file, PathBuf::from("/tmp/fsbench.lock"));
    }

    #[test]
    fn test_server_is_optional() {
        let yaml = r#"
log_root: logs
coordinator:
  program: coord
benchmark:
  name: smallfile
  program: build/smallfile
  target: /ssd-data/scalefs_bench
sweep:
  max_cores: 4
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert!(config.server.is_none());
        assert_eq!(config.benchmark.workload_list(), vec![None]);
    }

    #[test]
    fn test_stride_too_small_rejected() {
        let yaml = VALID_CONFIG.replace("shm_stride: 10", "shm_stride: 4");
        let err = ConfigLoader::load_string(&yaml).unwrap_err();
        assert!(matches!(err, BenchError::Allocation(_)));
    }

    #[test]
    fn test_stride_ignored_without_server() {
        let yaml = r#"
log_root: logs
allocation:
  shm_stride: 1
coordinator:
  program: coord
benchmark:
  name: smallfile
  program: build/smallfile
  target: /
sweep:
  max_cores: 4
"#;
        assert!(ConfigLoader::load_string(yaml).is_ok());
    }

    #[test]
    fn test_inverted_sweep_rejected() {
        let yaml = VALID_CONFIG.replace("max_cores: 10", "min_cores: 5\n  max_cores: 2");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_same_sentinels_rejected() {
        let yaml = VALID_CONFIG.replace(
            "process_name: fsMain",
            "process_name: fsMain\n  ready_sentinel: /tmp/x\n  exit_sentinel: /tmp/x",
        );
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_invalid_process_name_rejected() {
        let yaml = VALID_CONFIG.replace("process_name: fsMain", "process_name: /opt/ufs/fsMain");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_invalid_pin_core_rejected() {
        let yaml = VALID_CONFIG.replace("pin_core: 21", "pin_core: 99999");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_bad_benchmark_name_rejected() {
        let yaml = VALID_CONFIG.replace("name: largefile", "name: large/file");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_bad_workload_name_rejected() {
        for bad in ["../escape", "a/b", "with space", "\"\""] {
            let yaml = VALID_CONFIG.replace(
                "workloads: [create, overwrite]",
                &format!("workloads: [create, {}]", bad),
            );
            assert!(ConfigLoader::load_string(&yaml).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_bad_setting_value_rejected() {
        let yaml = VALID_CONFIG.replace("shm_id: \"9\"", "shm_id: \"9;\"");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_zero_grace_rejected() {
        let yaml = VALID_CONFIG.replace("shutdown_grace_ms: 15000", "shutdown_grace_ms: 0");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_phase_config_merges_overrides() {
        let yaml = VALID_CONFIG.replace(
            "    serverCorePolicyNo: \"5\"\n",
            "    serverCorePolicyNo: \"5\"\n  phase_settings:\n    prep:\n      splitPolicyNum: \"0\"\n  post_shutdown_command: [/opt/ufs/fsProcOfflineCheckpointer]\n",
        );
        let config = ConfigLoader::load_string(&yaml).unwrap();
        let server = config.server.unwrap();

        let (path, merged) = server.phase_config("prep").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/fsp-prep.conf"));
        assert_eq!(merged["splitPolicyNum"], "0");
        assert_eq!(merged["serverCorePolicyNo"], "5");
        assert!(server.phase_config("create").is_none());
        assert_eq!(
            server.post_shutdown.unwrap().program,
            PathBuf::from("/opt/ufs/fsProcOfflineCheckpointer")
        );
    }

    #[test]
    fn test_bad_phase_name_rejected() {
        let yaml = VALID_CONFIG.replace(
            "    serverCorePolicyNo: \"5\"\n",
            "    serverCorePolicyNo: \"5\"\n  phase_settings:\n    ../x:\n      a: \"1\"\n",
        );
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_server_workers_axis() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.sweep.worker_axis(), vec![None]);
        assert_eq!(config.sweep.max_server_workers(), 10);

        let yaml = VALID_CONFIG.replace("max_cores: 10", "max_cores: 10\n  server_workers: [1, 2, 4]");
        let config = ConfigLoader::load_string(&yaml).unwrap();
        assert_eq!(config.sweep.worker_axis(), vec![Some(1), Some(2), Some(4)]);
        assert_eq!(config.sweep.max_server_workers(), 4);
    }

    #[test]
    fn test_zero_server_workers_rejected() {
        let yaml = VALID_CONFIG.replace("max_cores: 10", "max_cores: 10\n  server_workers: [0]");
        assert!(ConfigLoader::load_string(&yaml).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_file("/nonexistent/fsbench.yaml").unwrap_err();
        assert!(matches!(err, BenchError::ConfigNotFound { .. }));
    }
}
