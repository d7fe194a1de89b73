//! In-memory MemoryStore. Ephemeral; for tests and runs without persistence.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{MemoryEntry, MemoryError, MemoryStore};

/// Map-backed store. Keys list in sorted order so prompt assembly is
/// deterministic.
#[derive(Debug, Default)]
pub struct InMemoryMemory {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor from `(key, value)` pairs.
    pub fn from_entries<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemory {
    async fn list(&self) -> Result<Vec<String>, MemoryError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }

    async fn load(&self, keys: &[String]) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        keys.iter()
            .map(|key| {
                entries
                    .get(key)
                    .map(|value| MemoryEntry::new(key.clone(), value.clone()))
                    .ok_or_else(|| MemoryError::NotFound(key.clone()))
            })
            .collect()
    }

    async fn save(&self, new_entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for entry in new_entries {
            entries.insert(entry.key.clone(), entry.value.clone());
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
