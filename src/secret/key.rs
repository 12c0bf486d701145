use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::constant_time_eq;
use crate::crypto::{KEY_LEN, SALT_LEN, aead::secure_random};
use crate::error::{Result, VaultError};

/// Raw 256-bit symmetric key material.
///
/// The buffer is overwritten with zeros when the value is dropped, and
/// equality is checked in constant time. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    bytes: [u8; KEY_LEN],
}

impl Key {
    /// Generates a fresh random key from the OS CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut key = Key {
            bytes: [0u8; KEY_LEN],
        };
        secure_random(&mut key.bytes)?;
        Ok(key)
    }

    pub(crate) fn from_array(bytes: [u8; KEY_LEN]) -> Self {
        Key { bytes }
    }

    /// Builds a key from exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::InvalidInput(format!(
                "key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Key {
            bytes: [0u8; KEY_LEN],
        };
        key.bytes.copy_from_slice(bytes);
        Ok(key)
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Encodes the raw bytes as base64 for out-of-band transfer.
    ///
    /// Only meant for keys that leave the device on purpose, such as
    /// watermark keys.
    pub fn to_base64(&self) -> zeroize::Zeroizing<String> {
        zeroize::Zeroizing::new(STANDARD.encode(self.bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = zeroize::Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| VaultError::InvalidInput(format!("invalid key encoding: {e}")))?,
        );
        Self::from_slice(&raw)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key([REDACTED])")
    }
}

/// Per-vault random salt. Not secret, only unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Salt(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidInput(format!("invalid salt encoding: {e}")))?;
        let bytes: [u8; SALT_LEN] = raw
            .try_into()
            .map_err(|_| VaultError::InvalidInput("invalid salt length".into()))?;
        Ok(Salt(bytes))
    }
}
