// Durable local backup store
//
// Key-value interface addressed by a per-owner key (one page, one key). Only
// the AutoSaveManager instance for that owner writes or deletes its key;
// concurrent writers to the same key are last-writer-wins by policy.
//
// SqliteBackupStore survives application restarts within the same profile.
// MemoryBackupStore backs tests and ephemeral sessions.

use crate::api::types::LineEdit;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Locally durable snapshot of unsaved edits for one owner key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub owner_key: String,
    pub lines: Vec<LineEdit>,
    pub captured_at: DateTime<Utc>,
}

impl BackupRecord {
    pub fn new(owner_key: impl Into<String>, lines: Vec<LineEdit>) -> Self {
        Self {
            owner_key: owner_key.into(),
            lines,
            captured_at: Utc::now(),
        }
    }
}

pub trait BackupStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, StoreError>;
    fn put(&self, key: &str, record: &BackupRecord) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

pub struct SqliteBackupStore {
    conn: Mutex<Connection>,
}

impl SqliteBackupStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS backups (
                owner_key TEXT PRIMARY KEY,
                lines TEXT NOT NULL,
                captured_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl BackupStore for SqliteBackupStore {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, StoreError> {
        let conn = self.conn.lock();

        let row: Option<(String, DateTime<Utc>)> = conn
            .query_row(
                "SELECT lines, captured_at FROM backups WHERE owner_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((lines_json, captured_at)) => {
                let lines: Vec<LineEdit> = serde_json::from_str(&lines_json)?;
                Ok(Some(BackupRecord {
                    owner_key: key.to_string(),
                    lines,
                    captured_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, record: &BackupRecord) -> Result<(), StoreError> {
        let lines_json = serde_json::to_string(&record.lines)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO backups (owner_key, lines, captured_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_key) DO UPDATE SET
                lines = excluded.lines,
                captured_at = excluded.captured_at",
            params![key, lines_json, record.captured_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM backups WHERE owner_key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBackupStore {
    records: RwLock<HashMap<String, BackupRecord>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackupStore for MemoryBackupStore {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: &str, record: &BackupRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.write().remove(key);
        Ok(())
    }
}
