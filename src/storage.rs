//! Storage backend abstraction.
//!
//! The backend is a flat byte map offering point lookups and single-use write
//! transactions. A [`WriteTxn`] dropped without [`WriteTxn::commit`] discards
//! its pending writes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::sqlite::SqliteStorage;

/// Path value selecting the in-process [`MemoryStorage`]
pub const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Transactional key-value engine
pub trait Storage: Send + Sync {
    /// Read-only lookup of a single key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Open a write transaction
    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StorageError>;
}

/// Pending writes against a [`Storage`] backend
pub trait WriteTxn {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Open the backend configured by `path`
pub fn open(path: &str) -> Result<Arc<dyn Storage>, StorageError> {
    if path == MEMORY_PATH {
        tracing::info!("Using in-memory storage");
        return Ok(Arc::new(MemoryStorage::new()));
    }

    let storage = SqliteStorage::open(path)?;
    tracing::info!(path = %path, "Opened SQLite storage");
    Ok(Arc::new(storage))
}

/// In-process storage backed by a hash map
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StorageError> {
        Ok(Box::new(MemoryWriteTxn {
            storage: self,
            pending: Vec::new(),
        }))
    }
}

struct MemoryWriteTxn<'a> {
    storage: &'a MemoryStorage,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteTxn for MemoryWriteTxn<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.pending.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut entries = self
            .storage
            .entries
            .write()
            .map_err(|_| StorageError::Poisoned)?;
        entries.extend(self.pending);
        Ok(())
    }
}
