//! Key hierarchy and session engine for a local credential vault.
//!
//! A random master key protects every credential field. It is stored
//! encrypted under a key derived from PIN and passphrase, and that envelope
//! is wrapped once more under a [`KeyStore`] key that never leaves the
//! store. A [`Session`] gates access to the master key and tears itself
//! down after too many failed unlocks.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod lockout;
pub mod obfuscation;
pub mod secret;
pub mod session;
pub mod storage;
pub mod store;

pub use crate::config::Config;
pub use crate::crypto::{Encrypted, KdfParams, ValueKind};
pub use crate::error::{Result, VaultError};
pub use crate::keystore::{KeyStore, KeyStoreExt, SoftwareKeyStore};
pub use crate::lockout::{LockoutPolicy, LockoutStatus};
pub use crate::obfuscation::{deobfuscate, generate_watermark_key, obfuscate};
pub use crate::secret::{Key, Password, Salt};
pub use crate::session::{Session, SessionStatus};
pub use crate::storage::Storage;
pub use crate::store::{BlobStore, FileBlobStore, MemoryBlobStore};

#[cfg(feature = "os-keyring")]
pub use crate::keystore::OsKeyStore;

use anyhow::Context;
use directories::ProjectDirs;

/// `<data dir>/keyward/vault.json` for the current platform.
pub fn default_storage() -> anyhow::Result<Storage> {
    let project_dirs =
        ProjectDirs::from("", "", "keyward").context("could not determine platform directories")?;

    let path = project_dirs.data_dir().join("vault.json");

    Ok(Storage::new(path))
}

/// The software key file that belongs to a vault file.
pub fn key_storage_for(vault: &Storage) -> Storage {
    Storage::new(vault.path().with_extension("keys"))
}
