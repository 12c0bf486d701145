//! The process-wide session: who may use the master key, and for how long.
//!
//! A [`Session`] is created once by the application root and shared as
//! `Arc<Session>`. Its state sits behind one mutex which is held for the
//! whole of every transition, key derivation included, so no caller ever
//! observes a half-finished login.

mod vault;

pub use vault::entries;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::codec::{self, SecretValue};
use crate::config::Config;
use crate::crypto::{Encrypted, KdfParams, derive_unlock_key, derive_verification_key};
use crate::error::{Result, VaultError};
use crate::keystore::{
    ALIAS_CACHED_PASSPHRASE, ALIAS_MASTER_KEY, ALIAS_PIN_REFERENCE, ALIAS_TRANSPORT, KeyStore,
    KeyStoreExt,
};
use crate::lockout::{LockoutPolicy, LockoutStatus};
use crate::secret::{Key, Password, Salt};
use crate::store::BlobStore;

/// Key-free snapshot of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    LoggedOut,
    Locked,
    Unlocked,
}

enum State {
    LoggedOut,
    /// `shortcut` is the passphrase wrapped under the transport key.
    Locked { shortcut: Option<Encrypted> },
    Unlocked(Unlocked),
}

struct Unlocked {
    master_key: Key,
    last_activity: Instant,
    shortcut: Option<Encrypted>,
}

impl State {
    fn shortcut(&self) -> Option<&Encrypted> {
        match self {
            State::LoggedOut => None,
            State::Locked { shortcut } => shortcut.as_ref(),
            State::Unlocked(unlocked) => unlocked.shortcut.as_ref(),
        }
    }

    /// Drops the master key, keeps the shortcut.
    fn drop_master_key(&mut self) {
        let shortcut = match std::mem::replace(self, State::LoggedOut) {
            State::Unlocked(unlocked) => unlocked.shortcut,
            State::Locked { shortcut } => shortcut,
            State::LoggedOut => return,
        };
        *self = State::Locked { shortcut };
    }
}

pub struct Session {
    config: Config,
    keystore: Arc<dyn KeyStore>,
    blobs: Arc<dyn BlobStore>,
    lockout: LockoutPolicy,
    state: parking_lot::Mutex<State>,
}

impl Session {
    /// Starts in `LoggedOut` and rotates the transport key, so re-entry
    /// shortcuts from an earlier process can never be opened.
    pub fn new(
        config: Config,
        keystore: Arc<dyn KeyStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        config.validate()?;
        keystore.delete_key(ALIAS_TRANSPORT)?;
        debug!(
            hardware = keystore.is_hardware_backed(),
            max_login_attempts = config.max_login_attempts,
            "session created"
        );
        Ok(Self {
            lockout: LockoutPolicy::new(config.max_login_attempts),
            config,
            keystore,
            blobs,
            state: parking_lot::Mutex::new(State::LoggedOut),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }

    pub fn keystore(&self) -> &dyn KeyStore {
        self.keystore.as_ref()
    }

    /// Unlocks the vault with `pin` and, unless a shortcut applies, the
    /// passphrase.
    ///
    /// Passphrase sources, first one that works wins: `passphrase` itself,
    /// the copy this session kept wrapped under the transport key since the
    /// last successful login, then the cached passphrase under its hardware
    /// key. With none of them available the call fails with
    /// `PassphraseRequired` and no attempt is counted.
    ///
    /// A wrong PIN, a wrong passphrase and a corrupted PIN reference or
    /// master-key blob all count as one failed attempt and report `InvalidCredentials`; the
    /// failure that reaches the threshold logs out, wipes the shortcuts and
    /// reports `LockedOut`. Any other error leaves the state untouched.
    pub fn login(&self, pin: &Password, passphrase: Option<&Password>) -> Result<()> {
        let mut state = self.state.lock();
        let (salt, kdf) = self.load_params()?;

        let reference = self
            .blobs
            .get_encrypted(entries::PIN_REFERENCE)?
            .ok_or(VaultError::NoVault)?;
        let candidate = derive_verification_key(pin, &salt, kdf)?;
        let matches = match self.keystore.unwrap(&reference, ALIAS_PIN_REFERENCE) {
            Ok(stored) => stored == candidate,
            Err(VaultError::DecryptionFailed) => false,
            Err(e) => return Err(e),
        };
        if !matches {
            return Err(self.register_failure(&mut state));
        }

        let passphrase = match passphrase {
            Some(explicit) => explicit.clone(),
            None => self
                .fast_path_passphrase(&state)
                .ok_or(VaultError::PassphraseRequired)?,
        };

        let unlock_key = derive_unlock_key(pin, &passphrase, &salt, kdf)?;
        let master_key = match self.open_master_key(&unlock_key) {
            Ok(key) => key,
            Err(VaultError::DecryptionFailed) => return Err(self.register_failure(&mut state)),
            Err(e) => return Err(e),
        };

        self.lockout.reset();
        let shortcut = self.wrap_shortcut(&passphrase);
        *state = State::Unlocked(Unlocked {
            master_key,
            last_activity: Instant::now(),
            shortcut,
        });
        info!("session unlocked");
        Ok(())
    }

    /// Runs [`login`](Self::login) on a worker thread.
    pub fn spawn_login(
        self: &Arc<Self>,
        pin: Password,
        passphrase: Option<Password>,
    ) -> std::io::Result<JoinHandle<Result<()>>> {
        let session = Arc::clone(self);
        thread::Builder::new()
            .name("keyward-login".into())
            .spawn(move || session.login(&pin, passphrase.as_ref()))
    }

    /// `Unlocked -> Locked`. The master key is wiped; the vault and the
    /// transport shortcut stay.
    pub fn lock(&self) {
        let mut state = self.state.lock();
        if matches!(*state, State::Unlocked(_)) {
            state.drop_master_key();
            info!("session locked");
        }
    }

    /// Any state `-> LoggedOut`. Wipes every in-memory secret and rotates
    /// the transport key.
    pub fn logout(&self) {
        let mut state = self.state.lock();
        self.logout_locked(&mut state);
    }

    /// Locks an unlocked session idle for longer than the configured window.
    /// Returns whether it locked.
    pub fn expire_if_idle(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.expire_locked(&mut state, now)
    }

    /// Host went to the background.
    pub fn on_background(&self) {
        if self.config.lock_on_background {
            self.lock();
        }
    }

    /// Records user activity. A session already past its idle window is
    /// locked instead.
    pub fn touch(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.expire_locked(&mut state, now);
        if let State::Unlocked(unlocked) = &mut *state {
            unlocked.last_activity = now;
        }
    }

    /// The master key, or `None` unless unlocked.
    ///
    /// An idle session is locked first; otherwise the call counts as
    /// activity.
    pub fn current_master_key(&self) -> Option<Key> {
        let mut state = self.state.lock();
        self.expire_locked(&mut state, Instant::now());
        match &mut *state {
            State::Unlocked(unlocked) => {
                unlocked.last_activity = Instant::now();
                Some(unlocked.master_key.clone())
            }
            _ => None,
        }
    }

    /// Encrypts a field under the master key; `Denied` unless unlocked.
    pub fn encrypt_field<T: SecretValue>(&self, value: &T) -> Result<Encrypted> {
        let key = self.current_master_key().ok_or(VaultError::Denied)?;
        codec::encrypt(&key, value)
    }

    pub fn decrypt_field<T: SecretValue>(&self, encrypted: &Encrypted) -> Result<T> {
        let key = self.current_master_key().ok_or(VaultError::Denied)?;
        codec::decrypt(&key, encrypted)
    }

    /// Applies the idle timeout before answering.
    pub fn status(&self) -> SessionStatus {
        let mut state = self.state.lock();
        self.expire_locked(&mut state, Instant::now());
        match &*state {
            State::LoggedOut => SessionStatus::LoggedOut,
            State::Locked { .. } => SessionStatus::Locked,
            State::Unlocked(_) => SessionStatus::Unlocked,
        }
    }

    /// True unless unlocked.
    pub fn is_denied(&self) -> bool {
        self.status() != SessionStatus::Unlocked
    }

    pub fn is_logged_out(&self) -> bool {
        self.status() == SessionStatus::LoggedOut
    }

    fn load_params(&self) -> Result<(Salt, KdfParams)> {
        let salt = self
            .blobs
            .get_plain(entries::SALT)?
            .ok_or(VaultError::NoVault)?;
        let kdf = self
            .blobs
            .get_plain(entries::KDF)?
            .ok_or(VaultError::NoVault)?;
        let kdf: KdfParams = serde_json::from_str(&kdf).map_err(|e| {
            VaultError::Storage(anyhow::Error::new(e).context("failed to parse KDF parameters"))
        })?;
        Ok((Salt::from_base64(&salt)?, kdf))
    }

    /// Hardware layer first, then the PIN+passphrase layer.
    fn open_master_key(&self, unlock_key: &Key) -> Result<Key> {
        let outer = self
            .blobs
            .get_encrypted(entries::MASTER_KEY)?
            .ok_or(VaultError::NoVault)?;
        let inner: Encrypted = self.keystore.unwrap_value(ALIAS_MASTER_KEY, &outer)?;
        codec::decrypt_key(unlock_key, &inner)
    }

    fn fast_path_passphrase(&self, state: &State) -> Option<Password> {
        if let Some(shortcut) = state.shortcut() {
            match self
                .keystore
                .unwrap_value::<Password>(ALIAS_TRANSPORT, shortcut)
            {
                Ok(passphrase) => return Some(passphrase),
                Err(e) => debug!(error = %e, "transport shortcut unusable"),
            }
        }

        match self.blobs.get_encrypted(entries::CACHED_PASSPHRASE) {
            Ok(Some(cached)) => match self
                .keystore
                .unwrap_value::<Password>(ALIAS_CACHED_PASSPHRASE, &cached)
            {
                Ok(passphrase) => Some(passphrase),
                Err(e) => {
                    debug!(error = %e, "cached passphrase unusable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "cached passphrase unreadable");
                None
            }
        }
    }

    fn wrap_shortcut(&self, passphrase: &Password) -> Option<Encrypted> {
        let wrapped = self
            .keystore
            .get_or_create_key(ALIAS_TRANSPORT)
            .and_then(|()| self.keystore.wrap_value(ALIAS_TRANSPORT, passphrase));
        match wrapped {
            Ok(shortcut) => Some(shortcut),
            Err(e) => {
                warn!(error = %e, "could not keep passphrase for re-entry");
                None
            }
        }
    }

    fn register_failure(&self, state: &mut State) -> VaultError {
        match self.lockout.record_failure() {
            LockoutStatus::Retry { attempts, max } => {
                warn!(attempts, max, "unlock failed");
                VaultError::InvalidCredentials { attempts, max }
            }
            LockoutStatus::LockedOut { attempts } => {
                warn!(attempts, "too many failed unlocks, logging out");
                self.logout_locked(state);
                self.forget_cached_passphrase_locked();
                VaultError::LockedOut { attempts }
            }
        }
    }

    fn logout_locked(&self, state: &mut State) {
        *state = State::LoggedOut;
        if let Err(e) = self.keystore.delete_key(ALIAS_TRANSPORT) {
            warn!(error = %e, "failed to rotate transport key");
        }
        info!("session logged out");
    }

    fn expire_locked(&self, state: &mut State, now: Instant) -> bool {
        let idle = match &*state {
            State::Unlocked(unlocked) => now.saturating_duration_since(unlocked.last_activity),
            _ => return false,
        };
        if idle > self.config.inactivity_timeout() {
            state.drop_master_key();
            info!(idle_secs = idle.as_secs(), "session locked after inactivity");
            return true;
        }
        false
    }
}
