use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::serial::{Config, MAX_CHUNK_SIZE, DEFAULT_CHUNK_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed settings: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Tunables for the native layer, usually supplied once by the embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Largest single OS-level transfer, in bytes.
    pub chunk_size: usize,
    /// Read timeout applied to every newly opened port.
    pub default_read_timeout_ms: u64,
    /// Line configuration applied on open. `None` keeps whatever the driver reports.
    pub default_config: Option<Config>,
    pub monitor_interval_ms: u64,
    pub monitor_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_read_timeout_ms: 0,
            default_config: None,
            monitor_interval_ms: 500,
            monitor_debounce_ms: 100,
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(SettingsError::Invalid(format!(
                "chunk_size {} outside 1..={}",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if let Some(config) = &self.default_config {
            config
                .validate()
                .map_err(|e| SettingsError::Invalid(format!("default_config: {}", e)))?;
        }
        if self.monitor_interval_ms == 0 {
            return Err(SettingsError::Invalid("monitor_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}
