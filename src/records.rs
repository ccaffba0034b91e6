//! Anonymizing store writer and fetch reader.
//!
//! Every stored pair is indexed in both directions in the same key space, so a
//! fetch resolves either a literal key or a previously derived value. The two
//! directions are committed in separate transactions; see [`RecordStore::store`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::digest::HashAlgorithm;
use crate::error::{FetchError, StoreError};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
}

/// Body of `POST /store`; absent and `null` optional fields both read as empty
#[derive(Debug, Clone, Deserialize)]
pub struct StoreRequest {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Per-request hash algorithm override
    #[serde(default)]
    pub sha: Option<String>,
}

impl StoreRequest {
    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    pub fn sha(&self) -> &str {
        self.sha.as_deref().unwrap_or_default()
    }
}

pub struct RecordStore {
    storage: Arc<dyn Storage>,
    default_sha: String,
    audit: bool,
}

impl RecordStore {
    pub fn new(storage: Arc<dyn Storage>, default_sha: impl Into<String>, audit: bool) -> Self {
        Self {
            storage,
            default_sha: default_sha.into(),
            audit,
        }
    }

    /// Derive the value stored for `key` when the caller supplies none
    pub fn anonymize(&self, key: &str, sha: &str) -> String {
        HashAlgorithm::resolve(&self.default_sha, sha).hex_digest(key.as_bytes())
    }

    /// Persist `key -> value` and then `value -> key`.
    ///
    /// An empty `value` is replaced by the hex digest of `key`. The reverse
    /// write is only attempted after the forward commit succeeded; a reverse
    /// failure therefore leaves a one-directional index and is reported with
    /// the `Reverse` stage.
    pub fn store(&self, key: &str, value: &str, sha: &str) -> Result<Record, StoreError> {
        let value = if value.is_empty() {
            self.anonymize(key, sha)
        } else {
            value.to_string()
        };

        self.write(key, &value).map_err(StoreError::forward)?;
        if self.audit {
            info!(key = %key, value = %value, "record stored");
        }

        self.write(&value, key).map_err(StoreError::reverse)?;
        if self.audit {
            info!(key = %value, value = %key, "record stored");
        }

        Ok(Record {
            key: key.to_string(),
            value,
        })
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut txn = self.storage.begin_write()?;
        txn.set(key.as_bytes(), value.as_bytes())?;
        txn.commit()
    }

    /// Look up `key` in a read-only transaction
    pub fn fetch(&self, key: &str) -> Result<Record, FetchError> {
        let value = self
            .storage
            .get(key.as_bytes())?
            .ok_or_else(|| FetchError::NotFound(key.to_string()))?;

        Ok(Record {
            key: key.to_string(),
            value: String::from_utf8_lossy(&value).into_owned(),
        })
    }
}
