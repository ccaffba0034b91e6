//! Persistent storage backed by a single SQLite table.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::storage::{Storage, StorageError, WriteTxn};

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

pub struct SqliteStorage {
    connection: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let connection = Connection::open(path)?;
        connection.execute_batch("PRAGMA journal_mode = wal;")?;
        connection.execute_batch("PRAGMA synchronous = normal;")?;
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (key BLOB PRIMARY KEY NOT NULL, value BLOB NOT NULL);",
        )?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let connection = self.connection.lock().map_err(|_| StorageError::Poisoned)?;
        let value = connection
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StorageError> {
        Ok(Box::new(SqliteWriteTxn {
            storage: self,
            pending: Vec::new(),
        }))
    }
}

struct SqliteWriteTxn<'a> {
    storage: &'a SqliteStorage,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteTxn for SqliteWriteTxn<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.pending.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut connection = self
            .storage
            .connection
            .lock()
            .map_err(|_| StorageError::Poisoned)?;
        let tx = connection.transaction()?;
        for (key, value) in &self.pending {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
