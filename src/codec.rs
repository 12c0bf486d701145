//! Typed authenticated encryption over the [`Encrypted`] envelope.
//!
//! One generic [`encrypt`]/[`decrypt`] pair does all envelope handling;
//! each value type only says how it turns into bytes and back via
//! [`SecretValue`]. The `encrypt_*`/`decrypt_*` functions are shorthands.
//!
//! All functions are pure given the key and can run concurrently.

use zeroize::Zeroizing;

use crate::crypto::{self, Encrypted, KEY_LEN, ValueKind};
use crate::error::{Result, VaultError};
use crate::secret::{Key, Password};

/// A value that can be sealed into an envelope.
pub trait SecretValue: Sized {
    const KIND: ValueKind;

    fn encode(&self) -> Zeroizing<Vec<u8>>;

    /// Rebuilds the value from authenticated plaintext.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl SecretValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn encode(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|_| VaultError::DecryptionFailed)
    }
}

impl SecretValue for Password {
    const KIND: ValueKind = ValueKind::Password;

    fn encode(&self) -> Zeroizing<Vec<u8>> {
        self.to_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Password::from_bytes(bytes).map_err(|_| VaultError::DecryptionFailed)
    }
}

impl SecretValue for i64 {
    const KIND: ValueKind = ValueKind::Integer;

    fn encode(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.to_le_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| VaultError::DecryptionFailed)?;
        Ok(i64::from_le_bytes(raw))
    }
}

impl SecretValue for Key {
    const KIND: ValueKind = ValueKind::Key;

    fn encode(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.expose().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::DecryptionFailed);
        }
        Key::from_slice(bytes)
    }
}

impl SecretValue for Encrypted {
    const KIND: ValueKind = ValueKind::Envelope;

    fn encode(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.to_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Encrypted::from_bytes(bytes)
    }
}

/// Seals raw bytes tagged as `kind`.
pub fn encrypt_raw(key: &Key, kind: ValueKind, plaintext: &[u8]) -> Result<Encrypted> {
    let header = Encrypted::header_for(kind);
    let (ciphertext, nonce) = crypto::seal(key, &header, plaintext)?;
    Ok(Encrypted::new(kind, nonce, ciphertext))
}

/// Opens an envelope without checking its kind.
pub fn decrypt_raw(key: &Key, encrypted: &Encrypted) -> Result<Zeroizing<Vec<u8>>> {
    crypto::open(
        key,
        encrypted.nonce(),
        &encrypted.header(),
        encrypted.ciphertext(),
    )
}

pub fn encrypt<T: SecretValue>(key: &Key, value: &T) -> Result<Encrypted> {
    encrypt_raw(key, T::KIND, &value.encode())
}

/// Decrypts and decodes; a kind other than `T`'s is `DecryptionFailed`.
pub fn decrypt<T: SecretValue>(key: &Key, encrypted: &Encrypted) -> Result<T> {
    if encrypted.kind() != T::KIND {
        return Err(VaultError::DecryptionFailed);
    }
    let plaintext = decrypt_raw(key, encrypted)?;
    T::decode(&plaintext)
}

pub fn encrypt_text(key: &Key, text: &str) -> Result<Encrypted> {
    encrypt_raw(key, ValueKind::Text, text.as_bytes())
}

pub fn decrypt_text(key: &Key, encrypted: &Encrypted) -> Result<String> {
    decrypt(key, encrypted)
}

pub fn encrypt_password(key: &Key, password: &Password) -> Result<Encrypted> {
    encrypt(key, password)
}

pub fn decrypt_password(key: &Key, encrypted: &Encrypted) -> Result<Password> {
    decrypt(key, encrypted)
}

pub fn encrypt_integer(key: &Key, value: i64) -> Result<Encrypted> {
    encrypt(key, &value)
}

pub fn decrypt_integer(key: &Key, encrypted: &Encrypted) -> Result<i64> {
    decrypt(key, encrypted)
}

/// Wraps `material` under `key` for storage or transport.
pub fn encrypt_key(key: &Key, material: &Key) -> Result<Encrypted> {
    encrypt(key, material)
}

pub fn decrypt_key(key: &Key, encrypted: &Encrypted) -> Result<Key> {
    decrypt(key, encrypted)
}

/// Nests an envelope inside another one.
pub fn encrypt_envelope(key: &Key, inner: &Encrypted) -> Result<Encrypted> {
    encrypt(key, inner)
}

pub fn decrypt_envelope(key: &Key, encrypted: &Encrypted) -> Result<Encrypted> {
    decrypt(key, encrypted)
}
