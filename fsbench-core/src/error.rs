//! Custom error types for fsbench.
//!
//! Every failure class is an explicit enum variant. No `Box<dyn Error>`,
//! no `anyhow::Result` - callers match on what went wrong.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the benchmark coordinator.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Resource Allocation Errors - Collisions Rejected Up Front
    // =========================================================================
    #[error("Resource allocation error: {0}")]
    Allocation(#[from] AllocationError),

    // =========================================================================
    // Server Lifecycle Errors
    // =========================================================================
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Server slot error: {0}")]
    Lease(#[from] LeaseError),

    // =========================================================================
    // Benchmark Run Errors
    // =========================================================================
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors stop the driver before anything is launched.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid core id: {core} - {reason}")]
    InvalidCore { core: u32, reason: String },

    #[error("Program path is empty for {context}")]
    EmptyProgram { context: &'static str },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// Misconfigured allocation parameters that would make resource ids collide.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("{what} must be at least 1")]
    ZeroCount { what: &'static str },

    #[error("{what} = {count} exceeds the supported maximum of {max}")]
    TooMany {
        what: &'static str,
        count: u32,
        max: u32,
    },

    #[error("Shared-memory stride {stride} is smaller than {apps} concurrent app slots")]
    StrideTooSmall { stride: u32, apps: u32 },

    #[error("Resource id arithmetic overflows for {what}")]
    Overflow { what: &'static str },
}

/// State transition errors for the server lifecycle state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition server from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Server is in terminal state: {state}")]
    TerminalState { state: &'static str },
}

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to spawn server '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server exited unexpectedly before signalling readiness (exit code: {code:?})")]
    UnexpectedExit { code: Option<i32> },

    #[error("Server did not signal readiness within {timeout_ms}ms")]
    StartupTimeout { timeout_ms: u64 },

    #[error("Sentinel {path} could not be updated: {source}")]
    Sentinel {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open server log {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to poll server process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },

    #[error("Forced kill of server '{name}' failed: {reason}")]
    ForceKillFailed { name: String, reason: String },

    #[error("Invalid lifecycle transition: {0}")]
    InvalidTransition(#[from] StateTransitionError),
}

/// Errors acquiring the exclusive server slot.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Server slot {path} is held by another run")]
    Busy { path: PathBuf },

    #[error("Failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("flock on {path} failed: {errno}")]
    Lock { path: PathBuf, errno: nix::Error },
}

/// Errors that prevent a benchmark run from being launched at all.
///
/// Member processes that exit badly are not errors; they are recorded in
/// the run result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run needs at least one worker core")]
    NoCores,

    #[error("Resource id space has {available} slots but the run needs {requested}")]
    NotEnoughSlots { requested: u32, available: u32 },

    #[error("Worker core {core} is out of range")]
    CoreOutOfRange { core: u32 },

    #[error("Failed to spawn {label} ('{program}'): {source}")]
    SpawnFailed {
        label: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;
