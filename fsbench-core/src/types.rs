// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time, so a value that
//! exists is a value that can be handed to the kernel or to `pkill` as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Highest core id accepted anywhere (matches the kernel's default CPU_SETSIZE).
pub const MAX_CORE_ID: u32 = 1023;

/// Length of the kernel's `comm` field, which is what name matching sees.
const MAX_PROCESS_NAME_LEN: usize = 15;

/// Validated CPU core identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CoreId(u32);

impl CoreId {
    /// Create a new CoreId with bounds validation.
    pub fn new(core: u32) -> Result<Self, HardValidationError> {
        if core > MAX_CORE_ID {
            return Err(HardValidationError::InvalidCore {
                core,
                reason: format!("Core id must not exceed {}", MAX_CORE_ID),
            });
        }
        Ok(Self(core))
    }

    /// Get the inner core index.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Core index as a `usize`, for `CpuSet`.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for CoreId {
    type Error = HardValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CoreId> for u32 {
    fn from(core: CoreId) -> Self {
        core.0
    }
}

/// Well-known process name used for the last-resort kill-by-name.
/// Non-empty, no path separators, at most 15 bytes (the kernel `comm` width).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessName(String);

impl ProcessName {
    /// Create a new ProcessName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_name",
                value: name,
                reason: "Process name cannot be empty".to_string(),
            });
        }

        if name.contains('/') {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_name",
                value: name,
                reason: "Process name is matched against comm and cannot contain '/'".to_string(),
            });
        }

        if name.len() > MAX_PROCESS_NAME_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_name",
                value: name.clone(),
                reason: format!(
                    "Process name too long: {} bytes (comm holds {})",
                    name.len(),
                    MAX_PROCESS_NAME_LEN
                ),
            });
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ProcessName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        name.0
    }
}

/// Validated process ID.
/// Must be positive (non-zero) and fit in `pid_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Create a new ProcessId with validation.
    pub fn new(pid: u32) -> Result<Self, HardValidationError> {
        if pid == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_id",
                value: "0".to_string(),
                reason: "Process ID 0 is reserved".to_string(),
            });
        }
        // Negative pids address process groups in kill(2).
        if pid > i32::MAX as u32 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_id",
                value: pid.to_string(),
                reason: "Process ID does not fit in pid_t".to_string(),
            });
        }
        Ok(Self(pid))
    }

    /// Get the inner PID value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Convert for use with `nix` signal and scheduling calls.
    pub fn as_nix(&self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0 as i32)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ProcessId> for u32 {
    fn from(pid: ProcessId) -> Self {
        pid.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_id_valid() {
        assert!(CoreId::new(0).is_ok());
        assert!(CoreId::new(21).is_ok());
        assert!(CoreId::new(MAX_CORE_ID).is_ok());
    }

    #[test]
    fn test_core_id_invalid() {
        assert!(CoreId::new(MAX_CORE_ID + 1).is_err());
    }

    #[test]
    fn test_process_name_valid() {
        assert!(ProcessName::new("fsMain").is_ok());
        assert!(ProcessName::new("a".repeat(15)).is_ok());
    }

    #[test]
    fn test_process_name_invalid() {
        assert!(ProcessName::new("").is_err());
        assert!(ProcessName::new("bin/fsMain").is_err());
        assert!(ProcessName::new("a".repeat(16)).is_err());
    }

    #[test]
    fn test_process_id_valid() {
        assert!(ProcessId::new(1).is_ok());
        assert!(ProcessId::new(12345).is_ok());
    }

    #[test]
    fn test_process_id_invalid() {
        assert!(ProcessId::new(0).is_err());
    }

    #[test]
    fn test_process_id_beyond_pid_t_rejected() {
        assert!(ProcessId::new(i32::MAX as u32).is_ok());
        assert!(ProcessId::new(i32::MAX as u32 + 1).is_err());
        assert!(ProcessId::new(u32::MAX).is_err());
    }

    #[test]
    fn test_process_id_as_nix_is_positive() {
        let pid = ProcessId::new(i32::MAX as u32).unwrap();
        assert_eq!(pid.as_nix().as_raw(), i32::MAX);
    }

    #[test]
    fn test_core_id_serde_rejects_out_of_range() {
        let parsed: Result<CoreId, _> = serde_yaml::from_str("5000");
        assert!(parsed.is_err());
        let parsed: CoreId = serde_yaml::from_str("3").unwrap();
        assert_eq!(parsed.value(), 3);
    }
}
