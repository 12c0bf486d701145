//! Wrapping-key storage behind a capability interface.
//!
//! A [`KeyStore`] owns named wrapping keys and only ever hands out
//! ciphertext: callers seal and open through it, the raw key bytes stay
//! inside. The rest of the engine does not know whether keys live in
//! secure hardware, the OS credential store, or a software fallback.

mod software;

#[cfg(feature = "os-keyring")]
mod os;

#[cfg(feature = "os-keyring")]
pub use os::OsKeyStore;
pub use software::SoftwareKeyStore;

use zeroize::Zeroizing;

use crate::codec::SecretValue;
use crate::crypto::{Encrypted, ValueKind};
use crate::error::{Result, VaultError};
use crate::secret::Key;

/// Wraps the in-memory passphrase shortcut; recreated every process start.
pub const ALIAS_TRANSPORT: &str = "keyward.transport";
/// Outer layer around the stored master key.
pub const ALIAS_MASTER_KEY: &str = "keyward.master-key";
/// Wraps the stored PIN verification reference.
pub const ALIAS_PIN_REFERENCE: &str = "keyward.pin-reference";
/// Wraps the cached passphrase used for PIN-only unlock.
pub const ALIAS_CACHED_PASSPHRASE: &str = "keyward.cached-passphrase";

pub const ALL_ALIASES: [&str; 4] = [
    ALIAS_TRANSPORT,
    ALIAS_MASTER_KEY,
    ALIAS_PIN_REFERENCE,
    ALIAS_CACHED_PASSPHRASE,
];

pub trait KeyStore: Send + Sync {
    /// Creates (or replaces) the key under `alias`.
    ///
    /// Fails with `KeyUnavailable` if `require_hardware` is set and this
    /// store is not hardware backed.
    fn generate_key(&self, alias: &str, require_hardware: bool) -> Result<()>;

    /// Makes sure a key exists under `alias`, creating one if needed.
    fn get_or_create_key(&self, alias: &str) -> Result<()>;

    /// Removes the key; everything wrapped under it becomes unreadable.
    fn delete_key(&self, alias: &str) -> Result<()>;

    fn contains_key(&self, alias: &str) -> bool;

    fn is_hardware_backed(&self) -> bool;

    /// Seals `material` under the key named `alias`.
    fn seal(&self, alias: &str, kind: ValueKind, material: &[u8]) -> Result<Encrypted>;

    /// Opens an envelope sealed under `alias`.
    fn open(&self, alias: &str, encrypted: &Encrypted) -> Result<Zeroizing<Vec<u8>>>;
}

/// Typed wrap/unwrap on top of any [`KeyStore`].
pub trait KeyStoreExt: KeyStore {
    fn wrap(&self, material: &Key, alias: &str) -> Result<Encrypted> {
        self.wrap_value(alias, material)
    }

    fn unwrap(&self, encrypted: &Encrypted, alias: &str) -> Result<Key> {
        self.unwrap_value(alias, encrypted)
    }

    fn wrap_value<T: SecretValue>(&self, alias: &str, value: &T) -> Result<Encrypted> {
        self.seal(alias, T::KIND, &value.encode())
    }

    fn unwrap_value<T: SecretValue>(&self, alias: &str, encrypted: &Encrypted) -> Result<T> {
        if encrypted.kind() != T::KIND {
            return Err(VaultError::DecryptionFailed);
        }
        let plaintext = self.open(alias, encrypted)?;
        T::decode(&plaintext)
    }
}

impl<S: KeyStore + ?Sized> KeyStoreExt for S {}
