//! fsbench Core Library
//!
//! Drives multi-core filesystem benchmarks against a user-space filesystem
//! server. Provides resource id allocation, the server lifecycle state
//! machine with sentinel-file signalling, run coordination for one
//! coordinator plus N workers, and the YAML configuration they are built from.

pub mod affinity;
pub mod alloc;
pub mod config;
pub mod error;
pub mod invocation;
pub mod lease;
pub mod maintenance;
pub mod run;
pub mod sentinel;
pub mod server;
pub mod server_config;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use alloc::{allocate, ResourceIdSpace};
pub use config::{Config, ConfigLoader};
pub use error::{
    AllocationError, BenchError, BenchResult, HardValidationError, LeaseError, RunError,
    ServerError,
};
pub use invocation::{
    BenchmarkInvocation, CommandSpec, CoordinatorInvocation, LaunchSpec, ServerLaunchArgs,
    WorkerSlot,
};
pub use lease::ServerLease;
pub use run::{ExitRecord, MemberResult, RunCoordinator, RunOptions, RunResult};
pub use server::{ForceKill, KillTarget, ServerController, ServerSettings, ShutdownOutcome};
pub use state::{ServerState, ServerStateMachine};
pub use types::{CoreId, ProcessId, ProcessName};
