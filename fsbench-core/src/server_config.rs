//! Flat `key = "value";` config files consumed by the server.
//!
//! The driver writes these from YAML maps before each sweep. Their meaning
//! belongs to the server; this module only renders them.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{BenchError, BenchResult, HardValidationError};

/// Render settings one per line, sorted by key.
pub fn render(settings: &BTreeMap<String, String>) -> String {
    settings
        .iter()
        .map(|(key, value)| format!("{} = \"{}\";\n", key, value))
        .collect()
}

/// Reject keys and values that would break the line format.
pub fn validate(
    field: &'static str,
    settings: &BTreeMap<String, String>,
) -> Result<(), HardValidationError> {
    for (key, value) in settings {
        let key_ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !key_ok {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: key.clone(),
                reason: "Keys must be non-empty and contain only [A-Za-z0-9_.]".to_string(),
            });
        }
        if value.contains(['"', '\n', ';']) {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: value.clone(),
                reason: format!("Value for '{}' cannot contain quotes, ';' or newlines", key),
            });
        }
    }
    Ok(())
}

/// Write a rendered config file, replacing any previous one.
pub fn write_config_file(path: &Path, settings: &BTreeMap<String, String>) -> BenchResult<()> {
    std::fs::write(path, render(settings)).map_err(|e| BenchError::Io {
        context: "writing server config file",
        source: e,
    })?;
    tracing::debug!(path = %path.display(), keys = settings.len(), "Wrote server config");
    Ok(())
}
