//! Settings export and import

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use uaswitch_core::settings::Document;
use uaswitch_core::{UaError, UaResult};
use uaswitch_store::SettingsStore;

/// Export format version
pub const EXPORT_VERSION: &str = "2.0";

/// Backup of the whole persisted settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: String,
    /// RFC 3339 time of export
    pub timestamp: String,
    pub data: Document,
}

impl ExportDocument {
    pub fn new(data: Document) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }

    /// Snapshot every persisted key, including ones this build does not know
    pub fn capture(store: &SettingsStore) -> UaResult<Self> {
        Ok(Self::new(store.get_all()?.into_document()))
    }

    /// Parse an import file
    ///
    /// Only `data` is required; it must be an object.
    pub fn parse(text: &str) -> UaResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| UaError::import_format(format!("not valid JSON ({})", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> UaResult<Self> {
        let Value::Object(mut root) = value else {
            return Err(UaError::import_format("expected a JSON object"));
        };

        let data = match root.remove("data") {
            Some(Value::Object(data)) => data,
            Some(_) => return Err(UaError::import_format("`data` must be an object")),
            None => return Err(UaError::import_format("missing `data`")),
        };

        let version = match root.remove("version") {
            Some(Value::String(version)) => version,
            _ => EXPORT_VERSION.to_string(),
        };
        if version != EXPORT_VERSION {
            warn!("Importing settings exported as version {}", version);
        }
        let timestamp = match root.remove("timestamp") {
            Some(Value::String(timestamp)) => timestamp,
            _ => String::new(),
        };

        Ok(Self {
            version,
            timestamp,
            data,
        })
    }

    pub fn to_json_pretty(&self) -> UaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Suggested file name for a download
    pub fn default_file_name() -> String {
        format!("uaswitch-settings-{}.json", Utc::now().timestamp_millis())
    }

    pub fn write(&self, path: &Path) -> UaResult<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> UaResult<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Replace the persisted state with this document's data
    pub fn restore(self, store: &SettingsStore) -> UaResult<()> {
        let keys = self.data.len();
        store.replace(self.data)?;
        info!("Imported {} settings", keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uaswitch_core::Update;

    #[test]
    fn test_export_shape() {
        let store = SettingsStore::in_memory();
        store.seed_defaults().unwrap();

        let export = ExportDocument::capture(&store).unwrap();
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["version"], "2.0");
        assert_eq!(value["data"]["activeUA"], "chrome_latest");
        assert!(chrono::DateTime::parse_from_rfc3339(&export.timestamp).is_ok());
    }

    #[test]
    fn test_missing_data_rejected() {
        let err = ExportDocument::from_value(json!({"version": "2.0"})).unwrap_err();
        assert!(matches!(err, UaError::ImportFormat(_)));
        assert!(err.to_string().starts_with("Invalid import file format"));

        let err = ExportDocument::from_value(json!({"data": [1, 2]})).unwrap_err();
        assert!(matches!(err, UaError::ImportFormat(_)));

        let err = ExportDocument::parse("[]").unwrap_err();
        assert!(matches!(err, UaError::ImportFormat(_)));

        let err = ExportDocument::parse("{oops").unwrap_err();
        assert!(matches!(err, UaError::ImportFormat(_)));
    }

    #[test]
    fn test_restore_replaces_everything() {
        let store = SettingsStore::in_memory();
        store.seed_defaults().unwrap();
        store
            .set(Update::new().set(
                uaswitch_core::SettingKey::AutoApply,
                json!(false),
            ))
            .unwrap();

        let import = ExportDocument::parse(
            r#"{"version":"2.0","timestamp":"2024-01-01T00:00:00.000Z","data":{"activeUA":"edge_latest","theme":"dark"}}"#,
        )
        .unwrap();
        import.restore(&store).unwrap();

        let document = store.get_all().unwrap().into_document();
        assert_eq!(document.len(), 2);
        assert_eq!(document["activeUA"], "edge_latest");
        assert_eq!(document["theme"], "dark");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");

        let mut data = Document::new();
        data.insert("enabled".to_string(), json!(true));
        let export = ExportDocument::new(data);
        export.write(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"version\": \"2.0\""));
        assert_eq!(ExportDocument::read(&path).unwrap(), export);
    }
}
