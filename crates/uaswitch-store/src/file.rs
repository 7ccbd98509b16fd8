//! JSON file backend

use crate::backend::StorageBackend;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uaswitch_core::settings::Document;
use uaswitch_core::{UaError, UaResult};

/// Stores the settings document as one pretty-printed JSON file
///
/// Commits write a sibling temp file and rename it over the target, so a
/// failed write never leaves a half-written document behind.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        log::info!("Using settings file {:?}", path);
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self) -> UaResult<Document> {
        if !self.path.exists() {
            return Ok(Document::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            UaError::storage(format!("Failed to read {:?}: {}", self.path, e))
        })?;
        if contents.trim().is_empty() {
            return Ok(Document::new());
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(UaError::storage(format!(
                "Settings file {:?} is not a JSON object",
                self.path
            ))),
            Err(e) => Err(UaError::storage(format!(
                "Settings file {:?} is corrupt: {}",
                self.path, e
            ))),
        }
    }

    fn commit(&self, document: &Document) -> UaResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UaError::storage(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let data = serde_json::to_string_pretty(document)
            .map_err(|e| UaError::storage(format!("Failed to serialize settings: {}", e)))?;

        let temp = self.temp_path();
        fs::write(&temp, data)
            .map_err(|e| UaError::storage(format!("Failed to write {:?}: {}", temp, e)))?;
        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            UaError::storage(format!("Failed to replace {:?}: {}", self.path, e))
        })?;

        log::debug!("Wrote {} settings keys to {:?}", document.len(), self.path);
        Ok(())
    }
}
