//! Self-describing ciphertext envelope.
//!
//! Binary layout:
//! ```text
//! MAGIC (4) | VERSION (1) | KIND (1) | NONCE (24) | CIPHERTEXT + TAG
//! ```
//! The first six bytes are bound as associated data, so a changed version
//! or kind byte fails authentication like any other tampering. The string
//! form is standard base64 of the binary layout.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::crypto::{KIND_LEN, MAGIC_LEN, NONCE_LEN, TAG_LEN, VER_LEN};
use crate::error::{Result, VaultError};

pub const VERSION_V1: u8 = 1;
pub const MAGIC: &[u8; MAGIC_LEN] = b"KWRD";

const HEADER_LEN: usize = MAGIC_LEN + VER_LEN + KIND_LEN;

/// Type tag of the value sealed inside an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueKind {
    Text = 1,
    Password = 2,
    Integer = 3,
    Key = 4,
    Envelope = 5,
}

impl TryFrom<u8> for ValueKind {
    type Error = VaultError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ValueKind::Text),
            2 => Ok(ValueKind::Password),
            3 => Ok(ValueKind::Integer),
            4 => Ok(ValueKind::Key),
            5 => Ok(ValueKind::Envelope),
            _ => Err(VaultError::DecryptionFailed),
        }
    }
}

/// An authenticated ciphertext. Immutable; re-encrypting yields a new value
/// with a fresh nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encrypted {
    version: u8,
    kind: ValueKind,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Encrypted {
    pub(crate) const MIN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

    pub(crate) fn new(kind: ValueKind, nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self {
            version: VERSION_V1,
            kind,
            nonce,
            ciphertext,
        }
    }

    /// Associated data for a value of `kind` in the current format.
    pub(crate) fn header_for(kind: ValueKind) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC_LEN].copy_from_slice(MAGIC);
        header[MAGIC_LEN] = VERSION_V1;
        header[MAGIC_LEN + VER_LEN] = kind as u8;
        header
    }

    pub(crate) fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = Self::header_for(self.kind);
        header[MAGIC_LEN] = self.version;
        header
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + NONCE_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.header());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    /// Parses the binary layout. Every malformed input is reported as
    /// `DecryptionFailed`, the same as a failed authentication.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(VaultError::DecryptionFailed);
        }

        if &data[..MAGIC_LEN] != MAGIC {
            return Err(VaultError::DecryptionFailed);
        }

        let version = data[MAGIC_LEN];
        if version != VERSION_V1 {
            return Err(VaultError::DecryptionFailed);
        }

        let kind = ValueKind::try_from(data[MAGIC_LEN + VER_LEN])?;

        let mut offset = HEADER_LEN;
        let nonce: [u8; NONCE_LEN] = data[offset..offset + NONCE_LEN]
            .try_into()
            .map_err(|_| VaultError::DecryptionFailed)?;
        offset += NONCE_LEN;

        Ok(Self {
            version,
            kind,
            nonce,
            ciphertext: data[offset..].to_vec(),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|_| VaultError::DecryptionFailed)?;
        Self::from_bytes(&data)
    }
}

impl fmt::Display for Encrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for Encrypted {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Encrypted {
        Encrypted::new(ValueKind::Password, [2u8; NONCE_LEN], vec![9u8; TAG_LEN + 5])
    }

    #[test]
    fn envelope_roundtrip() {
        let env = sample();
        let parsed = Encrypted::from_bytes(&env.to_bytes()).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.version(), VERSION_V1);
        assert_eq!(parsed.kind(), ValueKind::Password);

        let from_str: Encrypted = env.to_string().parse().unwrap();
        assert_eq!(from_str, env);
    }

    #[test]
    fn envelope_invalid_magic_fails() {
        let mut data = sample().to_bytes();
        data[..4].copy_from_slice(b"FAIL");
        assert!(matches!(
            Encrypted::from_bytes(&data),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn envelope_unsupported_version_fails() {
        let mut data = sample().to_bytes();
        data[MAGIC_LEN] = 99;
        assert!(Encrypted::from_bytes(&data).is_err());
    }

    #[test]
    fn envelope_unknown_kind_fails() {
        let mut data = sample().to_bytes();
        data[MAGIC_LEN + VER_LEN] = 42;
        assert!(Encrypted::from_bytes(&data).is_err());
    }

    #[test]
    fn envelope_too_short_fails() {
        let data = vec![0u8; Encrypted::MIN_LEN - 1];
        assert!(Encrypted::from_bytes(&data).is_err());
    }

    #[test]
    fn garbage_string_fails() {
        assert!(matches!(
            "%%%".parse::<Encrypted>(),
            Err(VaultError::DecryptionFailed)
        ));
    }
}
