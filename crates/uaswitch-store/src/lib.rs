//! Persisted settings store for UA Switch
//!
//! [`SettingsStore`] wraps a [`StorageBackend`] and adds key-level reads,
//! all-or-nothing partial writes, first-run seeding and change subscriptions.
//! Every write commits the whole merged document, so each backend only has to
//! make a single commit atomic.

pub mod backend;
pub mod file;
pub mod sqlite;

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uaswitch_core::settings::{self, Document};
use uaswitch_core::{AppConfig, BackendKind, SettingKey, Snapshot, UaResult, Update};

pub use backend::{MemoryBackend, StorageBackend};
pub use file::JsonFileBackend;
pub use sqlite::SqliteBackend;

/// A single key change
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Keys changed by one successful write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub changes: Vec<StorageChange>,
}

impl ChangeSet {
    /// Diff two documents; keys are reported in `before` order, then new keys
    pub fn between(before: &Document, after: &Document) -> Self {
        let mut changes = Vec::new();

        for (key, old) in before {
            match after.get(key) {
                Some(new) if new == old => {}
                new => changes.push(StorageChange {
                    key: key.clone(),
                    old_value: Some(old.clone()),
                    new_value: new.cloned(),
                }),
            }
        }
        for (key, new) in after {
            if !before.contains_key(key) {
                changes.push(StorageChange {
                    key: key.clone(),
                    old_value: None,
                    new_value: Some(new.clone()),
                });
            }
        }

        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.key.as_str())
    }

    pub fn contains(&self, key: SettingKey) -> bool {
        self.keys().any(|k| k == key.as_str())
    }

    /// Whether any changed key feeds the rule set
    pub fn touches_rules(&self) -> bool {
        self.keys().any(SettingKey::triggers_resync)
    }
}

type Listener = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`SettingsStore::on_change`]; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Process-wide settings store
pub struct SettingsStore {
    backend: Arc<dyn StorageBackend>,
    /// Document as of the last change this store reported
    observed: Mutex<Document>,
    listeners: Arc<Mutex<Listeners>>,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        // Unreadable backends start from an empty view; the first write reports everything
        let observed = match backend.load() {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Failed to load settings from {} backend: {}", backend.name(), e);
                Document::new()
            }
        };
        log::info!(
            "Settings store on {} backend ({} keys)",
            backend.name(),
            observed.len()
        );

        Self {
            backend,
            observed: Mutex::new(observed),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// Store over a fresh in-process backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Open the backend selected by `config`
    pub fn open(config: &AppConfig) -> UaResult<Self> {
        let backend: Arc<dyn StorageBackend> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::Json => Arc::new(JsonFileBackend::new(config.settings_path())),
            BackendKind::Sqlite => Arc::new(SqliteBackend::open(config.settings_path())?),
        };
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Current values for `keys`; unset keys are absent from the snapshot
    pub fn get(&self, keys: &[SettingKey]) -> UaResult<Snapshot> {
        let document = self.backend.load()?;
        let values = keys
            .iter()
            .filter_map(|key| {
                document
                    .get(key.as_str())
                    .map(|v| (key.as_str().to_string(), v.clone()))
            })
            .collect();
        Ok(Snapshot::new(values))
    }

    /// The whole persisted document, including keys this crate does not know
    pub fn get_all(&self) -> UaResult<Snapshot> {
        Ok(Snapshot::new(self.backend.load()?))
    }

    /// Merge `update` into persisted state; either every key persists or none does
    pub fn set(&self, update: impl Into<Update>) -> UaResult<()> {
        let update = update.into();
        if update.is_empty() {
            return Ok(());
        }

        let changes = {
            let mut observed = lock(&self.observed);
            let mut next = self.backend.load()?;
            for (key, value) in update.into_document() {
                next.insert(key, value);
            }
            self.backend.commit(&next)?;

            let changes = ChangeSet::between(&observed, &next);
            *observed = next;
            changes
        };

        self.notify(&changes);
        Ok(())
    }

    /// Remove every persisted key
    pub fn clear(&self) -> UaResult<()> {
        let changes = {
            let mut observed = lock(&self.observed);
            let empty = Document::new();
            self.backend.commit(&empty)?;

            let changes = ChangeSet::between(&observed, &empty);
            *observed = empty;
            changes
        };

        log::info!("Settings cleared");
        self.notify(&changes);
        Ok(())
    }

    /// Swap the whole persisted document for `document` in one commit
    ///
    /// A failed commit leaves the previous document in place.
    pub fn replace(&self, document: Document) -> UaResult<()> {
        let changes = {
            let mut observed = lock(&self.observed);
            self.backend.commit(&document)?;

            let changes = ChangeSet::between(&observed, &document);
            *observed = document;
            changes
        };

        log::info!("Settings replaced");
        self.notify(&changes);
        Ok(())
    }

    /// Write defaults if this is the first-ever use; returns whether it seeded
    pub fn seed_defaults(&self) -> UaResult<bool> {
        if self.get(&[SettingKey::Enabled])?.contains(SettingKey::Enabled) {
            return Ok(false);
        }

        self.set(settings::default_document())?;
        log::info!("Settings initialized with defaults");
        Ok(true)
    }

    /// Pick up writes made through another store on the same backend
    ///
    /// Listeners are notified of whatever differs from the last reported state.
    pub fn refresh(&self) -> UaResult<ChangeSet> {
        let changes = {
            let mut observed = lock(&self.observed);
            let current = self.backend.load()?;
            let changes = ChangeSet::between(&observed, &current);
            *observed = current;
            changes
        };

        self.notify(&changes);
        Ok(changes)
    }

    /// Register `listener` for every subsequent change
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn notify(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }

        log::debug!(
            "Settings changed: {:?}",
            changes.keys().collect::<Vec<_>>()
        );

        // Listeners run outside the lock so they may read or write the store
        let listeners: Vec<Listener> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(changes);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use uaswitch_core::UaError;

    fn recorder(store: &SettingsStore) -> (Arc<Mutex<Vec<ChangeSet>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store.on_change(move |changes| sink.lock().unwrap().push(changes.clone()));
        (seen, sub)
    }

    #[test]
    fn test_get_returns_only_set_keys() {
        let store = SettingsStore::in_memory();
        store.set(Update::new().active_ua("edge_latest")).unwrap();

        let snap = store
            .get(&[SettingKey::ActiveUa, SettingKey::Enabled])
            .unwrap();
        assert_eq!(snap.active_ua().as_deref(), Some("edge_latest"));
        assert!(!snap.contains(SettingKey::Enabled));
    }

    #[test]
    fn test_seed_defaults_once() {
        let store = SettingsStore::in_memory();
        assert!(store.seed_defaults().unwrap());
        assert!(!store.seed_defaults().unwrap());

        let snap = store.get_all().unwrap();
        assert_eq!(snap.enabled(), Some(true));
        assert_eq!(snap.active_ua().as_deref(), Some("chrome_latest"));
        assert_eq!(snap.auto_apply(), Some(true));
    }

    #[test]
    fn test_seed_keeps_existing_settings() {
        let store = SettingsStore::in_memory();
        store.set(Update::new().enabled(false)).unwrap();
        assert!(!store.seed_defaults().unwrap());
        assert_eq!(store.get_all().unwrap().document().len(), 1);
    }

    #[test]
    fn test_failed_set_applies_nothing() {
        let backend = Arc::new(MemoryBackend::with_quota(2));
        let store = SettingsStore::new(backend);
        store.set(Update::new().enabled(true)).unwrap();

        let (seen, _sub) = recorder(&store);
        let result = store.set(
            Update::new()
                .active_ua("firefox_latest")
                .auto_apply(false),
        );
        assert!(matches!(result, Err(UaError::Storage(_))));

        let snap = store.get_all().unwrap();
        assert_eq!(snap.active_ua(), None);
        assert_eq!(snap.auto_apply(), None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clear_failure_is_reported() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::new(backend.clone());
        store.seed_defaults().unwrap();

        backend.set_fail_writes(true);
        assert!(matches!(store.clear(), Err(UaError::Storage(_))));
        backend.set_fail_writes(false);
        assert_eq!(store.get_all().unwrap().enabled(), Some(true));
    }

    #[test]
    fn test_replace_swaps_whole_document() {
        let store = SettingsStore::in_memory();
        store.seed_defaults().unwrap();
        let (seen, _sub) = recorder(&store);

        let mut next = Document::new();
        next.insert("activeUA".to_string(), json!("edge_latest"));
        store.replace(next.clone()).unwrap();

        assert_eq!(store.get_all().unwrap().into_document(), next);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains(SettingKey::ActiveUa));
        assert!(seen[0].contains(SettingKey::Enabled));
    }

    #[test]
    fn test_failed_replace_keeps_previous_document() {
        let backend = Arc::new(MemoryBackend::with_quota(7));
        let store = SettingsStore::new(backend);
        store.seed_defaults().unwrap();
        store.set(Update::new().active_ua("firefox_latest")).unwrap();
        let before = store.get_all().unwrap();
        let (seen, _sub) = recorder(&store);

        let mut next = settings::default_document();
        next.insert("theme".to_string(), json!("dark"));
        next.insert("fontSize".to_string(), json!(14));
        let result = store.replace(next);

        assert!(matches!(result, Err(UaError::Storage(_))));
        assert_eq!(store.get_all().unwrap(), before);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_backend_starts_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_fail_reads(true);
        let store = SettingsStore::new(backend.clone());
        backend.set_fail_reads(false);

        let (seen, _sub) = recorder(&store);
        store.set(Update::new().enabled(true)).unwrap();
        assert_eq!(seen.lock().unwrap()[0].keys().collect::<Vec<_>>(), vec!["enabled"]);
    }

    #[test]
    fn test_listener_sees_changed_keys_once() {
        let store = SettingsStore::in_memory();
        let (seen, _sub) = recorder(&store);

        store
            .set(Update::new().enabled(true).active_ua("chrome_latest"))
            .unwrap();
        // Same values again: nothing changed
        store.set(Update::new().enabled(true)).unwrap();
        store.set(Update::new().active_ua("edge_latest")).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains(SettingKey::Enabled));
        assert!(seen[0].contains(SettingKey::ActiveUa));
        assert_eq!(seen[1].keys().collect::<Vec<_>>(), vec!["activeUA"]);
        assert_eq!(seen[1].changes[0].old_value, Some(json!("chrome_latest")));
        assert_eq!(seen[1].changes[0].new_value, Some(json!("edge_latest")));
    }

    #[test]
    fn test_clear_reports_removed_keys() {
        let store = SettingsStore::in_memory();
        store.seed_defaults().unwrap();
        let (seen, _sub) = recorder(&store);

        store.clear().unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].touches_rules());
        assert!(seen[0].changes.iter().all(|c| c.new_value.is_none()));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = SettingsStore::in_memory();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let sub = store.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set(Update::new().enabled(true)).unwrap();
        sub.unsubscribe();
        store.set(Update::new().enabled(false)).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_write_store() {
        let store = Arc::new(SettingsStore::in_memory());
        let inner = Arc::clone(&store);
        let _sub = store.on_change(move |changes| {
            if changes.contains(SettingKey::Enabled) {
                inner.set(Update::new().auto_apply(true)).unwrap();
            }
        });

        store.set(Update::new().enabled(true)).unwrap();
        assert_eq!(store.get_all().unwrap().auto_apply(), Some(true));
    }

    #[test]
    fn test_refresh_sees_other_store_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let first = SettingsStore::new(Arc::new(JsonFileBackend::new(&path)));
        let second = SettingsStore::new(Arc::new(JsonFileBackend::new(&path)));
        let (seen, _sub) = recorder(&first);

        second.set(Update::new().active_ua("firefox_latest")).unwrap();
        let changes = first.refresh().unwrap();

        assert!(changes.contains(SettingKey::ActiveUa));
        assert_eq!(seen.lock().unwrap().len(), 1);
        // Nothing new on a second refresh
        assert!(first.refresh().unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_keys_survive() {
        let store = SettingsStore::in_memory();
        let mut doc = Document::new();
        doc.insert("legacyFlag".to_string(), json!(1));
        store.set(doc).unwrap();
        store.set(Update::new().enabled(true)).unwrap();

        assert_eq!(store.get_all().unwrap().document()["legacyFlag"], json!(1));
    }

    #[test]
    fn test_sqlite_store_round_trip() {
        let store = SettingsStore::new(Arc::new(SqliteBackend::open_in_memory().unwrap()));
        store.seed_defaults().unwrap();
        store.set(Update::new().active_ua("electron_13")).unwrap();
        assert_eq!(
            store.get(&[SettingKey::ActiveUa]).unwrap().active_ua().as_deref(),
            Some("electron_13")
        );
    }

    #[test]
    fn test_change_set_diff() {
        let before = match json!({"a": 1, "b": 2}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let after = match json!({"a": 1, "b": 3, "c": 4}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let diff = ChangeSet::between(&before, &after);
        assert_eq!(diff.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
