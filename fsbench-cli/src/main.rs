// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fsbench CLI
//!
//! Command-line driver for multi-core filesystem benchmark sweeps.

use clap::{Parser, Subcommand};

mod commands;

/// fsbench - Benchmark sweeps against a user-space filesystem server
#[derive(Parser)]
#[command(name = "fsbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "fsbench.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the benchmark over the configured range of core counts
    Sweep {
        /// Run a single step with this many cores instead of the full range
        #[arg(long)]
        cores: Option<u32>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Print the resource ids and server argv for a given size
    Alloc {
        /// Number of server workers
        #[arg(long)]
        workers: u32,

        /// Number of application slots
        #[arg(long)]
        apps: u32,

        /// Shared-memory offset stride
        #[arg(long, default_value_t = 10)]
        stride: u32,

        /// Added to every worker affinity
        #[arg(long, default_value_t = 0)]
        core_base: u32,
    },

    /// Run the between-run cleanup steps only
    Clean,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Sweep { cores } => commands::sweep::execute(&cli.config, cores).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Alloc {
            workers,
            apps,
            stride,
            core_base,
        } => commands::alloc::execute(workers, apps, stride, core_base).await,
        Commands::Clean => commands::clean::execute(&cli.config).await,
    }
}
