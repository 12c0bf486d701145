//! Software fallback for platforms without secure key hardware.
//!
//! Keys live in process memory and, when a [`Storage`] file is attached,
//! are mirrored to it as a private JSON map of base64 strings. The file is
//! only as safe as the filesystem permissions around it.

use std::collections::HashMap;

use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use parking_lot::Mutex;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::KeyStore;
use crate::codec;
use crate::crypto::{Encrypted, ValueKind};
use crate::error::{Result, VaultError};
use crate::secret::Key;
use crate::storage::Storage;

pub struct SoftwareKeyStore {
    keys: Mutex<HashMap<String, Key>>,
    backing: Option<Storage>,
}

impl SoftwareKeyStore {
    /// A store that forgets every key when dropped.
    pub fn in_memory() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            backing: None,
        }
    }

    /// Opens (or starts) a key file.
    pub fn open_file(storage: Storage) -> anyhow::Result<Self> {
        let mut keys = HashMap::new();
        if let Some(data) = storage.load_if_exists()? {
            let data = Zeroizing::new(data);
            let mut encoded: HashMap<String, String> =
                serde_json::from_slice(&data).context("failed to parse key file")?;
            for (alias, value) in encoded.iter() {
                let raw = Zeroizing::new(
                    STANDARD
                        .decode(value)
                        .with_context(|| format!("corrupted key '{alias}'"))?,
                );
                let key =
                    Key::from_slice(&raw).with_context(|| format!("corrupted key '{alias}'"))?;
                keys.insert(alias.clone(), key);
            }
            encoded.values_mut().for_each(Zeroize::zeroize);
        }
        debug!(count = keys.len(), path = %storage.path().display(), "software key store opened");
        Ok(Self {
            keys: Mutex::new(keys),
            backing: Some(storage),
        })
    }

    fn persist(&self, keys: &HashMap<String, Key>) -> Result<()> {
        let Some(storage) = &self.backing else {
            return Ok(());
        };
        let mut encoded: HashMap<&str, String> = keys
            .iter()
            .map(|(alias, key)| (alias.as_str(), String::clone(&key.to_base64())))
            .collect();
        let json = serde_json::to_vec(&encoded).context("failed to encode key file");
        encoded.values_mut().for_each(Zeroize::zeroize);
        let json = Zeroizing::new(json.map_err(VaultError::Storage)?);
        storage.save(&json).map_err(VaultError::Storage)
    }

    fn with_key<T>(&self, alias: &str, f: impl FnOnce(&Key) -> Result<T>) -> Result<T> {
        let keys = self.keys.lock();
        let key = keys
            .get(alias)
            .ok_or_else(|| VaultError::key_unavailable(alias, "no such key"))?;
        f(key)
    }
}

impl KeyStore for SoftwareKeyStore {
    fn generate_key(&self, alias: &str, require_hardware: bool) -> Result<()> {
        if require_hardware {
            return Err(VaultError::key_unavailable(
                alias,
                "secure hardware is not available",
            ));
        }
        let mut keys = self.keys.lock();
        keys.insert(alias.to_string(), Key::generate()?);
        self.persist(&keys)?;
        debug!(alias, "generated software key");
        Ok(())
    }

    fn get_or_create_key(&self, alias: &str) -> Result<()> {
        let mut keys = self.keys.lock();
        if keys.contains_key(alias) {
            return Ok(());
        }
        keys.insert(alias.to_string(), Key::generate()?);
        self.persist(&keys)?;
        debug!(alias, "generated software key");
        Ok(())
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        let mut keys = self.keys.lock();
        if keys.remove(alias).is_some() {
            self.persist(&keys)?;
            debug!(alias, "deleted software key");
        }
        Ok(())
    }

    fn contains_key(&self, alias: &str) -> bool {
        self.keys.lock().contains_key(alias)
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn seal(&self, alias: &str, kind: ValueKind, material: &[u8]) -> Result<Encrypted> {
        self.with_key(alias, |key| codec::encrypt_raw(key, kind, material))
    }

    fn open(&self, alias: &str, encrypted: &Encrypted) -> Result<Zeroizing<Vec<u8>>> {
        self.with_key(alias, |key| codec::decrypt_raw(key, encrypted))
    }
}
