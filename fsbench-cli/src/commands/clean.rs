// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fsbench clean` command - Run the between-run cleanup only.

use fsbench_core::maintenance::run_maintenance;
use fsbench_core::ConfigLoader;

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;

    tracing::info!(
        stragglers = config.maintenance.kill_stragglers.len(),
        reset = config.maintenance.reset_command.is_some(),
        "Running maintenance"
    );

    let report = run_maintenance(&config.maintenance).await;
    if report.is_clean() {
        println!("✓ Maintenance complete");
    } else {
        for step in &report.failed_steps {
            println!("✗ {}", step);
        }
    }
    Ok(())
}
