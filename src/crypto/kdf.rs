use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::KEY_LEN;
use crate::error::{Result, VaultError};
use crate::secret::{Key, Password, Salt};

const VERIFY_CONTEXT: &[u8] = b"keyward/pin-verification/v1\0";
const UNLOCK_CONTEXT: &[u8] = b"keyward/master-unlock/v1\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            // default memory cost
            mem_cost_kib: 64 * 1024, // 64 MiB
            // default number of itereations
            time_cost: 3,
            // default number of threads
            parallelism: 1,
        }
    }
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn validate(&self) -> Result<()> {
        let problem = if self.mem_cost_kib < 8 {
            "argon2 memory cost too low"
        } else if self.time_cost < 1 {
            "argon2 time cost must be >= 1"
        } else if self.parallelism < 1 {
            "argon2 parallelism must be >= 1"
        } else if self.mem_cost_kib < 8 * self.parallelism {
            "argon2 memory cost must be at least 8 * parallelism"
        } else {
            return Ok(());
        };
        Err(VaultError::InvalidInput(problem.to_string()))
    }

    fn hash_into(&self, input: &[u8], salt: &Salt) -> Result<Key> {
        self.validate()?;

        let params = Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| VaultError::InvalidInput(format!("failed to construct Argon2 params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(input, salt.as_bytes(), &mut out[..])
            .map_err(|e| VaultError::InvalidInput(format!("argon2 key derivation failed {e}")))?;

        Ok(Key::from_array(*out))
    }
}

/// Derives the key used only to check a PIN.
///
/// Deterministic for a given `(pin, salt, kdf)`; slow on purpose.
pub fn derive_verification_key(pin: &Password, salt: &Salt, kdf: KdfParams) -> Result<Key> {
    let pin = pin.to_bytes();
    let mut input = Zeroizing::new(Vec::with_capacity(VERIFY_CONTEXT.len() + pin.len()));
    input.extend_from_slice(VERIFY_CONTEXT);
    input.extend_from_slice(&pin);
    kdf.hash_into(&input, salt)
}

/// Derives the key that wraps the master key from PIN and passphrase.
///
/// Domain separated from [`derive_verification_key`], so a leaked PIN
/// reference says nothing about this key even with an empty passphrase.
pub fn derive_unlock_key(
    pin: &Password,
    passphrase: &Password,
    salt: &Salt,
    kdf: KdfParams,
) -> Result<Key> {
    let pin = pin.to_bytes();
    let passphrase = passphrase.to_bytes();
    let mut input = Zeroizing::new(Vec::with_capacity(
        UNLOCK_CONTEXT.len() + 4 + pin.len() + passphrase.len(),
    ));
    input.extend_from_slice(UNLOCK_CONTEXT);
    // length prefix keeps ("12", "34x") and ("123", "4x") apart
    input.extend_from_slice(&(pin.len() as u32).to_le_bytes());
    input.extend_from_slice(&pin);
    input.extend_from_slice(&passphrase);
    kdf.hash_into(&input, salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(256, 1, 1).unwrap()
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = Salt::from_bytes([42u8; 16]);
        let pin = Password::new("1234");

        let k1 = derive_verification_key(&pin, &salt, fast()).unwrap();
        let k2 = derive_verification_key(&pin, &salt, fast()).unwrap();

        assert_eq!(k1, k2);
    }

    #[test]
    fn distinct_pins_give_distinct_keys() {
        let salt = Salt::from_bytes([1u8; 16]);
        let k1 = derive_verification_key(&Password::new("1234"), &salt, fast()).unwrap();
        let k2 = derive_verification_key(&Password::new("1235"), &salt, fast()).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn salt_changes_output() {
        let pin = Password::new("1234");
        let k1 = derive_verification_key(&pin, &Salt::from_bytes([1u8; 16]), fast()).unwrap();
        let k2 = derive_verification_key(&pin, &Salt::from_bytes([2u8; 16]), fast()).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn unlock_key_is_separated_from_verification_key() {
        let salt = Salt::from_bytes([3u8; 16]);
        let pin = Password::new("1234");
        let verify = derive_verification_key(&pin, &salt, fast()).unwrap();
        let unlock = derive_unlock_key(&pin, &Password::default(), &salt, fast()).unwrap();
        assert_ne!(verify, unlock);
    }

    #[test]
    fn unlock_key_depends_on_split_point() {
        let salt = Salt::from_bytes([4u8; 16]);
        let a = derive_unlock_key(&Password::new("12"), &Password::new("34x"), &salt, fast())
            .unwrap();
        let b = derive_unlock_key(&Password::new("123"), &Password::new("4x"), &salt, fast())
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = Salt::from_bytes([7u8; 16]);
        let pin = Password::new("pw");

        let kdf1 = KdfParams::new(512, 1, 1).unwrap();
        let kdf2 = KdfParams::new(1024, 1, 1).unwrap();

        let k1 = derive_verification_key(&pin, &salt, kdf1).unwrap();
        let k2 = derive_verification_key(&pin, &salt, kdf2).unwrap();

        assert_ne!(k1, k2);
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(KdfParams::new(0, 0, 0).is_err());
        assert!(KdfParams::new(8, 1, 2).is_err());
    }

    #[test]
    fn kdf_params_serde() {
        let kdf = KdfParams::new(4096, 2, 1).unwrap();
        let json = serde_json::to_string(&kdf).unwrap();
        let back: KdfParams = serde_json::from_str(&json).unwrap();
        assert_eq!(kdf, back);
    }
}
