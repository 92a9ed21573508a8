//! Store configuration.
//!
//! Loaded from a JSON file, from the environment, or both (environment
//! variables win). Every field has a default, so an empty object is a
//! valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;
use crate::error::ConfigError;

pub const ENV_DATABASE_PATH: &str = "DOCFLOW_DATABASE_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "DOCFLOW_BUSY_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    /// Enable write-ahead logging for file databases.
    pub wal: bool,
    pub recorder: RecorderConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path().unwrap_or_else(|| PathBuf::from("docflow.db")),
            busy_timeout_ms: 5_000,
            wal: true,
            recorder: RecorderConfig::default(),
        }
    }
}

/// Settings for the background performance sample writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RecorderConfig {
    /// Samples buffered before new ones are dropped.
    pub capacity: usize,
    /// Samples written per transaction.
    pub batch_size: usize,
    /// Longest time a buffered sample waits before being written.
    pub flush_interval_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            batch_size: 256,
            flush_interval_ms: 500,
        }
    }
}

impl StoreConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `DOCFLOW_*` overrides resolved through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    name: ENV_BUSY_TIMEOUT_MS,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        validate_config(&self)?;
        Ok(self)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StoreConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<StoreConfig, ConfigError> {
    let config: StoreConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "databasePath must not be empty".to_string(),
        });
    }

    let recorder = &config.recorder;
    if recorder.capacity == 0 {
        return Err(ConfigError::Validation {
            message: "recorder.capacity must be at least 1".to_string(),
        });
    }
    if recorder.batch_size == 0 || recorder.batch_size > recorder.capacity {
        return Err(ConfigError::Validation {
            message: format!(
                "recorder.batchSize must be between 1 and capacity ({}), got {}",
                recorder.capacity, recorder.batch_size
            ),
        });
    }
    if recorder.flush_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "recorder.flushIntervalMs must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.wal);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_partial_config() {
        let config = load_config_from_str(
            r#"{"databasePath": "/var/lib/docflow/store.db", "recorder": {"batchSize": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/docflow/store.db"));
        assert_eq!(config.recorder.batch_size, 10);
        assert_eq!(config.recorder.capacity, 10_000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = load_config_from_str(r#"{"databaseUrl": "postgres://"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_invalid_recorder_rejected() {
        let err = load_config_from_str(r#"{"recorder": {"capacity": 4, "batchSize": 8}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(load_config_from_str(r#"{"databasePath": ""}"#).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docflow.json");
        std::fs::write(&path, r#"{"busyTimeoutMs": 250, "wal": false}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(!config.wal);

        let err = load_config(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "/tmp/docflow-env.db"),
            (ENV_BUSY_TIMEOUT_MS, "1500"),
        ]
        .into_iter()
        .collect();

        let config = StoreConfig::default()
            .with_env_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/docflow-env.db"));
        assert_eq!(config.busy_timeout_ms, 1500);
    }

    #[test]
    fn test_env_override_invalid_number() {
        let err = StoreConfig::default()
            .with_env_overrides(|name| (name == ENV_BUSY_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_BUSY_TIMEOUT_MS,
                ..
            }
        ));
    }
}
