//! Persistence for the blobs the engine reads and writes.
//!
//! The engine never owns a storage schema. It asks a [`BlobStore`] for named
//! string entries, some of them envelopes in base64 form and some plain
//! values such as the salt.

use std::collections::HashMap;

use anyhow::Context;
use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::Encrypted;
use crate::error::{Result, VaultError};
use crate::storage::Storage;

pub trait BlobStore: Send + Sync {
    fn get_plain(&self, name: &str) -> Result<Option<String>>;

    /// Inserts or replaces the entry.
    fn put_plain(&self, name: &str, value: &str) -> Result<()>;

    /// Removes the entry; removing a missing entry succeeds.
    fn delete(&self, name: &str) -> Result<()>;

    /// A stored value that does not parse as an envelope is reported as
    /// `DecryptionFailed`, the same as one that fails authentication.
    fn get_encrypted(&self, name: &str) -> Result<Option<Encrypted>> {
        self.get_plain(name)?
            .map(|encoded| Encrypted::from_base64(&encoded))
            .transpose()
    }

    fn put_encrypted(&self, name: &str, value: &Encrypted) -> Result<()> {
        self.put_plain(name, &value.to_base64())
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct Records {
    entries: HashMap<String, Record>,
    creation_date: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct Record {
    value: String,
    updated: String,
}

impl Record {
    fn new(value: String) -> Self {
        Self {
            value,
            updated: Local::now().to_string(),
        }
    }

    fn update_value(&mut self, new_value: String) {
        self.value = new_value;
        self.updated = Local::now().to_string();
    }
}

impl Records {
    fn new() -> Self {
        Records {
            entries: HashMap::new(),
            creation_date: Local::now().to_string(),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|r| r.value.as_str())
    }

    fn set(&mut self, name: &str, value: &str) {
        match self.entries.get_mut(name) {
            Some(record) => record.update_value(value.to_string()),
            None => {
                self.entries
                    .insert(name.to_string(), Record::new(value.to_string()));
            }
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    fn updated(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|r| r.updated.as_str())
    }
}

/// Entries held in process memory only.
pub struct MemoryBlobStore {
    records: Mutex<Records>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Records::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get_plain(&self, name: &str) -> Result<Option<String>> {
        Ok(self.records.lock().get(name).map(str::to_string))
    }

    fn put_plain(&self, name: &str, value: &str) -> Result<()> {
        self.records.lock().set(name, value);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.records.lock().remove(name);
        Ok(())
    }
}

/// Entries kept in one JSON file, rewritten atomically on every change.
///
/// The file disappears once the last entry is deleted.
pub struct FileBlobStore {
    storage: Storage,
    records: Mutex<Records>,
}

impl FileBlobStore {
    pub fn open(storage: Storage) -> anyhow::Result<Self> {
        let records = match storage.load_if_exists()? {
            Some(data) => serde_json::from_slice(&data)
                .with_context(|| format!("failed to parse {}", storage.path().display()))?,
            None => Records::new(),
        };
        debug!(path = %storage.path().display(), "blob store opened");
        Ok(Self {
            storage,
            records: Mutex::new(records),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn creation_date(&self) -> String {
        self.records.lock().creation_date.clone()
    }

    /// Local time of the last write to `name`.
    pub fn updated(&self, name: &str) -> Option<String> {
        self.records.lock().updated(name).map(str::to_string)
    }

    fn persist(&self, records: &Records) -> Result<()> {
        if records.entries.is_empty() {
            return self.storage.remove().map_err(VaultError::Storage);
        }
        let json = serde_json::to_vec_pretty(records)
            .context("failed to encode blob store")
            .map_err(VaultError::Storage)?;
        self.storage.save(&json).map_err(VaultError::Storage)
    }
}

impl BlobStore for FileBlobStore {
    fn get_plain(&self, name: &str) -> Result<Option<String>> {
        Ok(self.records.lock().get(name).map(str::to_string))
    }

    fn put_plain(&self, name: &str, value: &str) -> Result<()> {
        let mut records = self.records.lock();
        records.set(name, value);
        self.persist(&records)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut records = self.records.lock();
        if records.remove(name) {
            self.persist(&records)?;
        }
        Ok(())
    }
}
