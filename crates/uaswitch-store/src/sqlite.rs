//! SQLite backend

use crate::backend::StorageBackend;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uaswitch_core::settings::Document;
use uaswitch_core::{UaError, UaResult};

/// Stores each settings key as one row; commits run in a single transaction
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create the settings database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> UaResult<Self> {
        log::info!("Opening settings database at {:?}", path.as_ref());

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UaError::storage(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| UaError::storage(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> UaResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| UaError::storage(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> UaResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                position INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| UaError::storage(format!("Failed to create table: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self) -> UaResult<Document> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key, value FROM settings ORDER BY position")
            .map_err(|e| UaError::storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| UaError::storage(e.to_string()))?;

        let mut document = Document::new();
        for row in rows {
            let (key, raw) = row.map_err(|e| UaError::storage(e.to_string()))?;
            let value: Value = serde_json::from_str(&raw).map_err(|e| {
                UaError::storage(format!("Corrupt value for {}: {}", key, e))
            })?;
            document.insert(key, value);
        }

        Ok(document)
    }

    fn commit(&self, document: &Document) -> UaResult<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| UaError::storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute("DELETE FROM settings", [])
            .map_err(|e| UaError::storage(e.to_string()))?;

        for (position, (key, value)) in document.iter().enumerate() {
            let raw = serde_json::to_string(value)
                .map_err(|e| UaError::storage(format!("Failed to serialize {}: {}", key, e)))?;
            tx.execute(
                "INSERT INTO settings (key, value, position) VALUES (?1, ?2, ?3)",
                params![key, raw, position as i64],
            )
            .map_err(|e| UaError::storage(e.to_string()))?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit()
            .map_err(|e| UaError::storage(format!("Failed to commit settings: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_empty_database() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_commit_replaces_document() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .commit(&document(json!({"enabled": true, "activeUA": "edge_latest"})))
            .unwrap();
        backend.commit(&document(json!({"enabled": false}))).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["enabled"], json!(false));
    }

    #[test]
    fn test_persists_across_reopen_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.db");

        let doc = document(json!({
            "domainRules": {"z.com": "chrome_latest", "a.com": "edge_latest"},
            "autoApply": true
        }));
        SqliteBackend::open(&path).unwrap().commit(&doc).unwrap();

        let reopened = SqliteBackend::open(&path).unwrap();
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded, doc);
        let keys: Vec<_> = loaded.keys().cloned().collect();
        assert_eq!(keys, vec!["domainRules", "autoApply"]);
    }
}
