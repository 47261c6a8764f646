// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CPU topology helpers and kernel-level pinning.
//!
//! Benchmark workers normally pin themselves from their `-c` flag. When the
//! run asks for it, the coordinator additionally pins each child with
//! `sched_setaffinity` right after spawning it.

use std::path::Path;

use nix::sched::{sched_setaffinity, CpuSet};

use crate::types::{CoreId, ProcessId};

/// Kernel list of online CPUs.
const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Pin a process to exactly one core.
pub fn pin_to_core(pid: ProcessId, core: CoreId) -> Result<(), nix::Error> {
    let mut cpuset = CpuSet::new();
    cpuset.set(core.index())?;
    sched_setaffinity(pid.as_nix(), &cpuset)?;

    tracing::debug!(pid = pid.value(), core = core.value(), "Process pinned to core");
    Ok(())
}

/// Online CPUs as reported by sysfs.
/// Falls back to `0..num_cpus::get()` when sysfs is unavailable.
pub fn online_cpus() -> Vec<usize> {
    online_cpus_from(Path::new(ONLINE_CPUS_PATH))
}

fn online_cpus_from(path: &Path) -> Vec<usize> {
    if let Ok(list) = std::fs::read_to_string(path) {
        let cpus = parse_cpu_list(list.trim());
        if !cpus.is_empty() {
            return cpus;
        }
    }

    (0..num_cpus::get()).collect()
}

/// Parse a CPU list string like "0-3,8-11" into a Vec of CPU indices.
pub fn parse_cpu_list(s: &str) -> Vec<usize> {
    let mut cpus = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                cpus.extend(start..=end);
            }
        } else if let Ok(cpu) = part.parse::<usize>() {
            cpus.push(cpu);
        }
    }
    cpus
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_parse_cpu_list_range() {
        assert_eq!(parse_cpu_list("0-3"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_cpu_list_discrete() {
        assert_eq!(parse_cpu_list("0,2,4"), vec![0, 2, 4]);
    }

    #[test]
    fn test_parse_cpu_list_empty() {
        assert_eq!(parse_cpu_list(""), Vec::<usize>::new());
    }

    #[test]
    fn test_parse_cpu_list_complex() {
        assert_eq!(
            parse_cpu_list("0,2-4,7,10-12"),
            vec![0, 2, 3, 4, 7, 10, 11, 12]
        );
    }

    #[test]
    fn test_online_cpus_non_empty() {
        assert!(!online_cpus().is_empty());
    }

    #[test]
    fn test_online_cpus_fallback() {
        let cpus = online_cpus_from(Path::new("/nonexistent/cpu/online"));
        assert_eq!(cpus.len(), num_cpus::get());
        assert_eq!(cpus[0], 0);
    }

    #[test]
    fn test_pin_child_process() {
        let Ok(mut child) = Command::new("sleep").arg("5").spawn() else {
            return;
        };
        let pid = ProcessId::new(child.id()).unwrap();
        let core = CoreId::new(online_cpus()[0] as u32).unwrap();

        // May be refused in restricted sandboxes; must not panic either way.
        match pin_to_core(pid, core) {
            Ok(()) => println!("Pinned {} to core {}", pid, core),
            Err(e) => println!("Pin refused (restricted environment): {}", e),
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}
