// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fsbench validate` command - Validate configuration file.

use fsbench_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Sweep:");
            println!(
                "  Cores:              {}..={}",
                config.sweep.min_cores, config.sweep.max_cores
            );
            println!(
                "  Continue on fail:   {}",
                config.sweep.continue_on_failure
            );
            println!(
                "  Fail fast:          {}",
                config.sweep.run_options.fail_fast
            );
            println!("  Log root:           {}", config.log_root.display());
            println!();
            match &config.server {
                Some(server) => {
                    println!("Server:");
                    println!("  Program:            {}", server.settings.program.display());
                    println!("  Process name:       {}", server.settings.process_name);
                    println!(
                        "  Shutdown grace:     {}ms",
                        server.settings.shutdown_grace.as_millis()
                    );
                    println!(
                        "  Ready / exit:       {} / {}",
                        server.settings.ready_sentinel.display(),
                        server.settings.exit_sentinel.display()
                    );
                    println!(
                        "  SHM stride:         {}",
                        config.allocation.shm_stride
                    );
                }
                None => println!("Server: none (benchmark runs directly)"),
            }
            println!();
            println!("Benchmark {}:", config.benchmark.name);
            println!("  Program:            {}", config.benchmark.program.display());
            println!("  Target:             {}", config.benchmark.target.display());
            for workload in config.benchmark.workload_list() {
                println!("  - {}", workload.unwrap_or("(default)"));
            }
            println!(
                "Coordinator: {} (core {})",
                config.coordinator.program.display(),
                config.coordinator.pin_core
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
