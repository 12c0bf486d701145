use thiserror::Error;

/// Errors reported by the key hierarchy and session engine.
///
/// `DecryptionFailed` and `InvalidCredentials` are recoverable by asking the
/// user again. `LockedOut` ends the session and the host is expected to
/// restart. `KeyUnavailable` only affects data wrapped under that alias; the
/// recovery path is dropping and recreating the vault.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("key '{alias}' is unavailable: {reason}")]
    KeyUnavailable { alias: String, reason: String },

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("invalid PIN or passphrase (attempt {attempts} of {max})")]
    InvalidCredentials { attempts: u32, max: u32 },

    #[error("too many failed unlock attempts ({attempts}), session terminated")]
    LockedOut { attempts: u32 },

    #[error("passphrase required")]
    PassphraseRequired,

    #[error("vault is locked")]
    Denied,

    #[error("no vault has been created")]
    NoVault,

    #[error("a vault already exists")]
    VaultExists,

    #[error("PIN must have at least {min} characters")]
    WeakPin { min: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("OS random generator unavailable")]
    Entropy,

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl VaultError {
    pub(crate) fn key_unavailable(alias: &str, reason: impl Into<String>) -> Self {
        VaultError::KeyUnavailable {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that should send the user back to the PIN prompt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::DecryptionFailed
                | VaultError::InvalidCredentials { .. }
                | VaultError::PassphraseRequired
        )
    }

    /// Errors after which the host should tear the process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VaultError::LockedOut { .. })
    }
}

pub type Result<T, E = VaultError> = std::result::Result<T, E>;
