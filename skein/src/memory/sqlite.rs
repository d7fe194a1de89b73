//! SQLite-backed MemoryStore. Persistent across process restarts.
//!
//! One table, `memory_kv(key PRIMARY KEY, value, updated_at)`. Each operation
//! opens its own connection inside `spawn_blocking` so the async runtime never
//! blocks on database I/O.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::params;

use super::{MemoryEntry, MemoryError, MemoryStore};

/// File-backed store behind the [`MemoryStore`] contract.
pub struct SqliteMemory {
    db_path: PathBuf,
}

impl SqliteMemory {
    /// Opens (or creates) the database at `path` and ensures the table exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS memory_kv (
                key TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
            [],
        )
        .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    fn open(db_path: &Path) -> Result<rusqlite::Connection, MemoryError> {
        rusqlite::Connection::open(db_path).map_err(|e| MemoryError::Storage(e.to_string()))
    }
}

#[async_trait]
impl MemoryStore for SqliteMemory {
    async fn list(&self) -> Result<Vec<String>, MemoryError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = SqliteMemory::open(&db_path)?;
            let mut stmt = conn
                .prepare("SELECT key FROM memory_kv ORDER BY key")
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| MemoryError::Storage(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(keys)
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn load(&self, keys: &[String]) -> Result<Vec<MemoryEntry>, MemoryError> {
        let db_path = self.db_path.clone();
        let keys = keys.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = SqliteMemory::open(&db_path)?;
            let mut stmt = conn
                .prepare("SELECT value FROM memory_kv WHERE key = ?1")
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let mut entries = Vec::with_capacity(keys.len());
            for key in keys {
                let value: Option<String> = stmt
                    .query_row(params![key], |row| row.get(0))
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(MemoryError::Storage(other.to_string())),
                    })?;
                match value {
                    Some(value) => entries.push(MemoryEntry { key, value }),
                    None => return Err(MemoryError::NotFound(key)),
                }
            }
            Ok(entries)
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn save(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        let db_path = self.db_path.clone();
        let entries = entries.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = SqliteMemory::open(&db_path)?;
            let now = chrono::Utc::now().timestamp_millis();
            for entry in entries {
                conn.execute(
                    "INSERT OR REPLACE INTO memory_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    params![entry.key, entry.value, now],
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn delete(&self, keys: &[String]) -> Result<(), MemoryError> {
        let db_path = self.db_path.clone();
        let keys = keys.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = SqliteMemory::open(&db_path)?;
            for key in keys {
                conn.execute("DELETE FROM memory_kv WHERE key = ?1", params![key])
                    .map_err(|e| MemoryError::Storage(e.to_string()))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: save/list/load/delete round-trip against a temp database;
    /// entries survive a reopen.
    #[tokio::test]
    async fn sqlite_round_trip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        let store = SqliteMemory::new(&path).unwrap();
        store
            .save(&[
                MemoryEntry::new("persona", "terse"),
                MemoryEntry::new("project", "skein"),
            ])
            .await
            .unwrap();
        assert_eq!(store.list().await.unwrap(), ["persona", "project"]);

        let reopened = SqliteMemory::new(&path).unwrap();
        let entries = reopened
            .load(&["project".to_string(), "persona".to_string()])
            .await
            .unwrap();
        assert_eq!(entries[0].value, "skein");
        assert_eq!(entries[1].value, "terse");

        reopened.delete(&["persona".to_string()]).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), ["project"]);
    }

    /// **Scenario**: loading a missing key fails with NotFound.
    #[tokio::test]
    async fn sqlite_load_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMemory::new(dir.path().join("memory.db")).unwrap();
        let err = store.load(&["ghost".to_string()]).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(k) if k == "ghost"));
    }
}
