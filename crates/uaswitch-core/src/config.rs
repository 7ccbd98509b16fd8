//! Application configuration

use crate::error::{UaError, UaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Dynamic rule cap of the declarative request engine
pub const DEFAULT_MAX_RULES: usize = 5000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the settings document and config file
    pub data_dir: PathBuf,

    /// Which persistence backend holds the settings
    pub backend: BackendKind,

    /// Log level filter for the binary ("error", "warn", "info", "debug", "trace")
    pub log_level: String,

    /// Maximum number of dynamic rules accepted by the rule host
    pub max_rules: usize,
}

/// Settings persistence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Json,
    Sqlite,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("uaswitch"),
            backend: BackendKind::Json,
            log_level: "info".to_string(),
            max_rules: DEFAULT_MAX_RULES,
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        Self::default().data_dir.join("config.json")
    }

    /// Load config from file, falling back to defaults when absent or malformed
    pub fn load(path: &Path) -> Self {
        if let Ok(contents) = std::fs::read_to_string(path) {
            match serde_json::from_str(&contents) {
                Ok(config) => return config,
                Err(e) => log::warn!("Ignoring malformed config {:?}: {}", path, e),
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> UaResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UaError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Path of the settings document for the file-based backends
    pub fn settings_path(&self) -> PathBuf {
        match self.backend {
            BackendKind::Sqlite => self.data_dir.join("settings.db"),
            _ => self.data_dir.join("settings.json"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "json" => Ok(BackendKind::Json),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(UaError::config(format!("Unknown backend: {}", other))),
        }
    }
}
