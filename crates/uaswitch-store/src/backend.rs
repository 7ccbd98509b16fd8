//! Persistence backends for the settings document

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uaswitch_core::settings::Document;
use uaswitch_core::{UaError, UaResult};

/// Underlying persistence layer of a [`SettingsStore`](crate::SettingsStore)
///
/// `commit` replaces the whole document. Implementations must apply it
/// entirely or not at all.
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read the full document; an empty document when nothing is persisted
    fn load(&self) -> UaResult<Document>;

    /// Persist `document` as the new full state
    fn commit(&self, document: &Document) -> UaResult<()>;
}

/// In-process backend, used by tests and the `memory` config option
#[derive(Default)]
pub struct MemoryBackend {
    document: Mutex<Document>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    max_keys: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects commits holding more than `max_keys` keys
    pub fn with_quota(max_keys: usize) -> Self {
        Self {
            max_keys: Some(max_keys),
            ..Self::default()
        }
    }

    /// Make every subsequent load fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent commit fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn document(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> UaResult<Document> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(UaError::storage("backend unavailable"));
        }
        Ok(self.document().clone())
    }

    fn commit(&self, document: &Document) -> UaResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(UaError::storage("backend unavailable"));
        }
        if let Some(max) = self.max_keys {
            if document.len() > max {
                return Err(UaError::storage(format!(
                    "quota exceeded ({} keys, limit {})",
                    document.len(),
                    max
                )));
            }
        }
        *self.document() = document.clone();
        Ok(())
    }
}
