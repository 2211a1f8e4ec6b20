//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{CacheLockError, Result};
use crate::fs::{build_globset, set_global_excludes};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(CacheLockError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheLockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| CacheLockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            CacheLockError::Config(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_timeout_ms` must be positive
    /// - every `global_excludes` entry must be a valid glob
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(CacheLockError::Config(
                "config validation failed: lock_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let Err(e) = build_globset(&self.global_excludes) {
            return Err(CacheLockError::Config(format!(
                "config validation failed: invalid global_excludes pattern: {}",
                e
            )));
        }

        Ok(())
    }

    /// The lock timeout as a duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Install `global_excludes` as the process-wide exclude patterns.
    pub fn apply_global_excludes(&self) {
        set_global_excludes(self.global_excludes.iter().cloned());
    }
}
