//! Wrapping keys kept in the operating system credential store.
//!
//! Each alias is one credential entry under the configured service name,
//! holding the base64 key. Key bytes are loaded for a single seal or open
//! and wiped straight after.
//!
//! The credential store keeps keys out of the vault directory, but it may be
//! a software keychain file, so it does not count as hardware backed.

use keyring::Entry;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::KeyStore;
use crate::codec;
use crate::crypto::{Encrypted, ValueKind};
use crate::error::{Result, VaultError};
use crate::secret::Key;

pub struct OsKeyStore {
    service: String,
}

impl OsKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> Result<Entry> {
        Entry::new(&self.service, alias)
            .map_err(|e| VaultError::key_unavailable(alias, e.to_string()))
    }

    fn load(&self, alias: &str) -> Result<Key> {
        let encoded = Zeroizing::new(self.entry(alias)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => VaultError::key_unavailable(alias, "no such key"),
            other => VaultError::key_unavailable(alias, other.to_string()),
        })?);
        Key::from_base64(&encoded).map_err(|_| VaultError::key_unavailable(alias, "corrupted key"))
    }

    fn store(&self, alias: &str, key: &Key) -> Result<()> {
        self.entry(alias)?
            .set_password(&key.to_base64())
            .map_err(|e| VaultError::key_unavailable(alias, e.to_string()))
    }
}

impl KeyStore for OsKeyStore {
    fn generate_key(&self, alias: &str, require_hardware: bool) -> Result<()> {
        if require_hardware {
            return Err(VaultError::key_unavailable(
                alias,
                "OS credential store is not secure hardware",
            ));
        }
        self.store(alias, &Key::generate()?)?;
        debug!(alias, service = %self.service, "generated OS key");
        Ok(())
    }

    fn get_or_create_key(&self, alias: &str) -> Result<()> {
        if self.contains_key(alias) {
            return Ok(());
        }
        self.generate_key(alias, false)
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        match self.entry(alias)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!(alias, error = %e, "failed to delete OS key");
                Err(VaultError::key_unavailable(alias, e.to_string()))
            }
        }
    }

    fn contains_key(&self, alias: &str) -> bool {
        self.load(alias).is_ok()
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn seal(&self, alias: &str, kind: ValueKind, material: &[u8]) -> Result<Encrypted> {
        let key = self.load(alias)?;
        codec::encrypt_raw(&key, kind, material)
    }

    fn open(&self, alias: &str, encrypted: &Encrypted) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.load(alias)?;
        codec::decrypt_raw(&key, encrypted)
    }
}
