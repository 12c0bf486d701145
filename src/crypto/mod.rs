//! Cryptographic primitives for the key hierarchy.
//!
//! Provides authenticated encryption, key derivation, and the ciphertext
//! envelope format.

pub mod aead;
pub mod envelope;
pub mod kdf;

pub use aead::{generate_salt, open, seal};
pub use envelope::{Encrypted, ValueKind};
pub use kdf::{KdfParams, derive_unlock_key, derive_verification_key};

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;
/// Length of the magic bytes (4 bytes "KWRD").
pub const MAGIC_LEN: usize = 4;
/// Length of the version field (1 byte).
pub const VER_LEN: usize = 1;
/// Length of the value kind field (1 byte).
pub const KIND_LEN: usize = 1;
