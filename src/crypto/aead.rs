use super::{NONCE_LEN, SALT_LEN};
use crate::error::{Result, VaultError};
use crate::secret::{Key, Salt};
use chacha20poly1305::{
    Key as CipherKey, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use getrandom::fill;
use zeroize::Zeroizing;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| VaultError::Entropy)
}

/// Generate salt
pub fn generate_salt() -> Result<Salt> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(Salt::from_bytes(salt))
}

/// Encrypt plaintext under a fresh random nonce, binding `aad`.
pub fn seal(key: &Key, aad: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = XChaCha20Poly1305::new(CipherKey::from_slice(key.expose()));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| VaultError::InvalidInput("encryption failed".into()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext; any authentication failure is `DecryptionFailed`.
pub fn open(
    key: &Key,
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(CipherKey::from_slice(key.expose()));

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}
