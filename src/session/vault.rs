//! Creating, exporting and dropping the vault behind a session.

use std::time::Instant;

use tracing::{info, warn};

use super::{Session, State};
use crate::codec;
use crate::crypto::{Encrypted, derive_unlock_key, derive_verification_key, generate_salt};
use crate::error::{Result, VaultError};
use crate::keystore::{
    ALIAS_CACHED_PASSPHRASE, ALIAS_MASTER_KEY, ALIAS_PIN_REFERENCE, ALIAS_TRANSPORT, ALL_ALIASES,
    KeyStore, KeyStoreExt,
};
use crate::secret::{Key, Password};
use crate::store::BlobStore;

/// Names of the entries a vault keeps in its [`BlobStore`](crate::store::BlobStore).
pub mod entries {
    /// Master key under the PIN+passphrase key, wrapped again in hardware.
    pub const MASTER_KEY: &str = "vault.master_key";
    /// PIN verification key wrapped in hardware.
    pub const PIN_REFERENCE: &str = "vault.pin_ref";
    pub const CACHED_PASSPHRASE: &str = "vault.cached_passphrase";
    /// Plain base64. Written last, so its presence means a complete vault.
    pub const SALT: &str = "vault.salt";
    /// Plain JSON Argon2 parameters.
    pub const KDF: &str = "vault.kdf";

    pub const ALL: [&str; 5] = [MASTER_KEY, PIN_REFERENCE, CACHED_PASSPHRASE, SALT, KDF];
}

impl Session {
    pub fn vault_exists(&self) -> Result<bool> {
        Ok(self.blobs.get_plain(entries::SALT)?.is_some())
    }

    /// Creates a vault with a fresh random master key.
    ///
    /// The session stays `LoggedOut`; call [`login`](Self::login) next. With
    /// `cache_passphrase` the passphrase is also stored under its own
    /// hardware key so later logins need only the PIN.
    pub fn create_vault(
        &self,
        pin: &Password,
        passphrase: &Password,
        cache_passphrase: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();

        if pin.len() < self.config.min_pin_len {
            return Err(VaultError::WeakPin {
                min: self.config.min_pin_len,
            });
        }
        if passphrase.is_empty() {
            return Err(VaultError::InvalidInput(
                "passphrase must not be empty".into(),
            ));
        }
        if self.vault_exists()? {
            return Err(VaultError::VaultExists);
        }

        let require_hardware = self.config.require_hardware;
        self.keystore
            .generate_key(ALIAS_MASTER_KEY, require_hardware)?;
        self.keystore
            .generate_key(ALIAS_PIN_REFERENCE, require_hardware)?;

        let kdf = self.config.kdf;
        let salt = generate_salt()?;
        let master_key = Key::generate()?;

        let unlock_key = derive_unlock_key(pin, passphrase, &salt, kdf)?;
        let inner = codec::encrypt_key(&unlock_key, &master_key)?;
        let outer = self.keystore.wrap_value(ALIAS_MASTER_KEY, &inner)?;

        let reference = derive_verification_key(pin, &salt, kdf)?;
        let reference = self.keystore.wrap(&reference, ALIAS_PIN_REFERENCE)?;

        self.blobs.put_encrypted(entries::MASTER_KEY, &outer)?;
        self.blobs.put_encrypted(entries::PIN_REFERENCE, &reference)?;
        if cache_passphrase {
            self.store_cached_passphrase(passphrase)?;
        }
        let kdf_json = serde_json::to_string(&kdf).map_err(|e| {
            VaultError::Storage(anyhow::Error::new(e).context("failed to encode KDF parameters"))
        })?;
        self.blobs.put_plain(entries::KDF, &kdf_json)?;
        self.blobs.put_plain(entries::SALT, &salt.to_base64())?;

        *state = State::LoggedOut;
        self.lockout.reset();
        info!(
            hardware = self.keystore.is_hardware_backed(),
            cache_passphrase, "vault created"
        );
        Ok(())
    }

    /// Logs out and deletes every entry and wrapping key of the vault.
    ///
    /// This is also the way out of `KeyUnavailable`: the data under a lost
    /// key cannot come back, so the vault is started over.
    pub fn drop_vault(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.logout_locked(&mut state);
        for name in entries::ALL {
            self.blobs.delete(name)?;
        }
        for alias in ALL_ALIASES {
            self.keystore.delete_key(alias)?;
        }
        self.lockout.reset();
        warn!("vault dropped");
        Ok(())
    }

    /// The master key still encrypted under the PIN+passphrase key, with
    /// the hardware layer removed. Useful as an offline backup that needs
    /// PIN, passphrase and salt to open.
    pub fn export_master_key(&self) -> Result<Encrypted> {
        let mut state = self.state.lock();
        self.expire_locked(&mut state, Instant::now());
        if !matches!(*state, State::Unlocked(_)) {
            return Err(VaultError::Denied);
        }
        let outer = self
            .blobs
            .get_encrypted(entries::MASTER_KEY)?
            .ok_or(VaultError::NoVault)?;
        self.keystore.unwrap_value(ALIAS_MASTER_KEY, &outer)
    }

    /// Stores `passphrase` for PIN-only logins. Only while unlocked, and
    /// only the passphrase that unlocked this session is accepted.
    pub fn cache_passphrase(&self, passphrase: &Password) -> Result<()> {
        let mut state = self.state.lock();
        self.expire_locked(&mut state, Instant::now());
        let State::Unlocked(unlocked) = &*state else {
            return Err(VaultError::Denied);
        };
        if let Some(shortcut) = &unlocked.shortcut {
            let current: Password = self
                .keystore
                .unwrap_value(ALIAS_TRANSPORT, shortcut)?;
            if !current.ct_eq(passphrase) {
                return Err(VaultError::InvalidInput(
                    "passphrase does not match the unlocked vault".into(),
                ));
            }
        }
        self.store_cached_passphrase(passphrase)?;
        info!("passphrase cached");
        Ok(())
    }

    pub fn forget_cached_passphrase(&self) -> Result<()> {
        self.blobs.delete(entries::CACHED_PASSPHRASE)?;
        self.keystore.delete_key(ALIAS_CACHED_PASSPHRASE)?;
        info!("cached passphrase removed");
        Ok(())
    }

    pub fn has_cached_passphrase(&self) -> Result<bool> {
        Ok(self
            .blobs
            .get_plain(entries::CACHED_PASSPHRASE)?
            .is_some())
    }

    fn store_cached_passphrase(&self, passphrase: &Password) -> Result<()> {
        self.keystore
            .generate_key(ALIAS_CACHED_PASSPHRASE, self.config.require_hardware)?;
        let wrapped = self
            .keystore
            .wrap_value(ALIAS_CACHED_PASSPHRASE, passphrase)?;
        self.blobs
            .put_encrypted(entries::CACHED_PASSPHRASE, &wrapped)
    }

    /// Best effort; used on lockout where the error to report is fixed.
    pub(super) fn forget_cached_passphrase_locked(&self) {
        if let Err(e) = self.forget_cached_passphrase() {
            warn!(error = %e, "failed to remove cached passphrase");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::KdfParams;
    use crate::keystore::SoftwareKeyStore;
    use crate::store::MemoryBlobStore;
    use std::sync::Arc;

    struct Fixture {
        session: Session,
        blobs: Arc<MemoryBlobStore>,
        keystore: Arc<SoftwareKeyStore>,
    }

    fn fixture() -> Fixture {
        let blobs = Arc::new(MemoryBlobStore::new());
        let keystore = Arc::new(SoftwareKeyStore::in_memory());
        let config = Config {
            kdf: KdfParams::new(256, 1, 1).unwrap(),
            ..Config::default()
        };
        let session = Session::new(config, keystore.clone(), blobs.clone()).unwrap();
        Fixture {
            session,
            blobs,
            keystore,
        }
    }

    fn pin() -> Password {
        Password::new("1234")
    }

    fn passphrase() -> Password {
        Password::new("passphrase")
    }

    #[test]
    fn create_writes_all_entries() {
        let f = fixture();
        assert!(!f.session.vault_exists().unwrap());
        f.session.create_vault(&pin(), &passphrase(), true).unwrap();

        assert!(f.session.vault_exists().unwrap());
        for name in entries::ALL {
            assert!(f.blobs.get_plain(name).unwrap().is_some(), "{name} missing");
        }
        assert!(f.session.is_logged_out());
    }

    #[test]
    fn short_pin_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.session.create_vault(&Password::new("123"), &passphrase(), false),
            Err(VaultError::WeakPin { min: 4 })
        ));
        assert!(!f.session.vault_exists().unwrap());
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.session.create_vault(&pin(), &Password::default(), false),
            Err(VaultError::InvalidInput(_))
        ));
    }

    #[test]
    fn second_create_is_refused() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), false).unwrap();
        assert!(matches!(
            f.session.create_vault(&pin(), &passphrase(), false),
            Err(VaultError::VaultExists)
        ));
    }

    #[test]
    fn hardware_requirement_fails_on_software_store() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let config = Config {
            kdf: KdfParams::new(256, 1, 1).unwrap(),
            require_hardware: true,
            ..Config::default()
        };
        let session =
            Session::new(config, Arc::new(SoftwareKeyStore::in_memory()), blobs).unwrap();
        assert!(matches!(
            session.create_vault(&pin(), &passphrase(), false),
            Err(VaultError::KeyUnavailable { .. })
        ));
    }

    #[test]
    fn cached_passphrase_allows_pin_only_login() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), true).unwrap();
        assert!(f.session.has_cached_passphrase().unwrap());

        f.session.login(&pin(), None).unwrap();
        assert!(!f.session.is_denied());
    }

    #[test]
    fn forgetting_cached_passphrase() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), true).unwrap();
        f.session.forget_cached_passphrase().unwrap();

        assert!(!f.session.has_cached_passphrase().unwrap());
        assert!(!f.keystore.contains_key(ALIAS_CACHED_PASSPHRASE));
        assert!(matches!(
            f.session.login(&pin(), None),
            Err(VaultError::PassphraseRequired)
        ));
    }

    #[test]
    fn cache_passphrase_after_unlock() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), false).unwrap();
        assert!(matches!(
            f.session.cache_passphrase(&passphrase()),
            Err(VaultError::Denied)
        ));

        f.session.login(&pin(), Some(&passphrase())).unwrap();
        assert!(f
            .session
            .cache_passphrase(&Password::new("other"))
            .is_err());
        f.session.cache_passphrase(&passphrase()).unwrap();

        f.session.logout();
        f.session.login(&pin(), None).unwrap();
    }

    #[test]
    fn export_needs_unlock_and_opens_with_unlock_key() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), false).unwrap();
        assert!(matches!(
            f.session.export_master_key(),
            Err(VaultError::Denied)
        ));

        f.session.login(&pin(), Some(&passphrase())).unwrap();
        let exported = f.session.export_master_key().unwrap();

        let salt = crate::secret::Salt::from_base64(
            &f.blobs.get_plain(entries::SALT).unwrap().unwrap(),
        )
        .unwrap();
        let unlock_key =
            derive_unlock_key(&pin(), &passphrase(), &salt, f.session.config().kdf).unwrap();
        assert_eq!(
            codec::decrypt_key(&unlock_key, &exported).unwrap(),
            f.session.current_master_key().unwrap()
        );
    }

    #[test]
    fn export_denied_after_lock_or_idle() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), false).unwrap();
        f.session.login(&pin(), Some(&passphrase())).unwrap();
        f.session.lock();
        assert!(matches!(
            f.session.export_master_key(),
            Err(VaultError::Denied)
        ));


        let config = Config {
            inactivity_timeout_secs: 1,
            ..f.session.config().clone()
        };
        let idle = Session::new(config, f.keystore.clone(), f.blobs.clone()).unwrap();
        idle.login(&pin(), Some(&passphrase())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1300));
        assert!(matches!(idle.export_master_key(), Err(VaultError::Denied)));
    }

    #[test]
    fn drop_removes_everything() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), true).unwrap();
        f.session.login(&pin(), Some(&passphrase())).unwrap();

        f.session.drop_vault().unwrap();

        assert!(f.session.is_logged_out());
        assert!(f.blobs.is_empty());
        for alias in ALL_ALIASES {
            assert!(!f.keystore.contains_key(alias));
        }
        f.session.create_vault(&pin(), &passphrase(), false).unwrap();
    }

    #[test]
    fn lost_master_key_alias_is_key_unavailable() {
        let f = fixture();
        f.session.create_vault(&pin(), &passphrase(), false).unwrap();
        f.keystore.delete_key(ALIAS_MASTER_KEY).unwrap();

        assert!(matches!(
            f.session.login(&pin(), Some(&passphrase())),
            Err(VaultError::KeyUnavailable { .. })
        ));
        assert_eq!(f.session.lockout().failures(), 0);
    }
}
