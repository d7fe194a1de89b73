//! Memory store contract consumed by the kernel.
//!
//! A memory store is a small keyed blob store: [`MemoryStore::list`] returns
//! the known keys, [`MemoryStore::load`] resolves keys to entries in a stable
//! order for a given key sequence, and save/delete mutate. The kernel only
//! ever calls `list` then `load` when assembling system content; save and
//! delete exist for tooling and maintenance.
//!
//! Backends: [`InMemoryMemory`] for tests and ephemeral runs,
//! [`SqliteMemory`] for the CLI's `-memory <path>`.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryMemory;
pub use sqlite::SqliteMemory;

use async_trait::async_trait;
use thiserror::Error;

/// One keyed memory blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub key: String,
    pub value: String,
}

impl MemoryEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Memory store error.
///
/// Backend errors are carried as opaque text so callers do not depend on
/// backend types.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory entry not found: {0}")]
    NotFound(String),

    #[error("storage: {0}")]
    Storage(String),
}

/// Minimal key/value blob store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Returns all keys. Order is stable between calls absent mutation.
    async fn list(&self) -> Result<Vec<String>, MemoryError>;

    /// Resolves `keys` to entries, in the order the keys were given.
    ///
    /// A missing key is a [`MemoryError::NotFound`].
    async fn load(&self, keys: &[String]) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Inserts or overwrites entries.
    async fn save(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError>;

    /// Removes entries. Deleting an absent key is not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), MemoryError>;
}
