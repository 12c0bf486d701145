//! Display-time obfuscation of passwords.
//!
//! Every character is shifted inside its own alphabet by a keystream derived
//! from a watermark key: printable ASCII stays printable ASCII, control
//! characters stay control characters, and everything else moves within the
//! remaining Unicode scalar values. The result has the same length as the
//! password and can be shown or handed to another party; only a holder of
//! the watermark key can reverse it. The watermark key is unrelated to the
//! master key and is exported with [`Key::to_base64`] for out-of-band
//! transfer.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::secret::{Key, Password};

type HmacSha256 = Hmac<Sha256>;

/// Inclusive code point ranges, concatenated into one cyclic alphabet.
type Alphabet = &'static [(u32, u32)];

const PRINTABLE: Alphabet = &[(0x20, 0x7e)];
const CONTROL: Alphabet = &[(0x00, 0x1f), (0x7f, 0x9f)];
// surrogates are not chars
const OTHER: Alphabet = &[(0xa0, 0xd7ff), (0xe000, 0x10ffff)];
const ALPHABETS: [Alphabet; 3] = [PRINTABLE, CONTROL, OTHER];

const KEYSTREAM_CONTEXT: &[u8] = b"keyward-obfuscation";
// 32 byte HMAC block, four bytes per offset
const OFFSETS_PER_BLOCK: usize = 8;

/// Creates a fresh random watermark key.
pub fn generate_watermark_key() -> Result<Key> {
    Key::generate()
}

pub fn obfuscate(password: &Password, watermark: &Key) -> Result<Password> {
    transform(password, watermark, |index, offset, size| {
        (index + offset) % size
    })
}

/// Exact inverse of [`obfuscate`] under the same watermark key.
pub fn deobfuscate(password: &Password, watermark: &Key) -> Result<Password> {
    transform(password, watermark, |index, offset, size| {
        (index + size - offset) % size
    })
}

fn transform(
    password: &Password,
    watermark: &Key,
    shift: impl Fn(u32, u32, u32) -> u32,
) -> Result<Password> {
    let offsets = keystream(watermark, password.len())?;
    let chars = password
        .chars()
        .iter()
        .zip(offsets.iter())
        .map(|(&c, &offset)| {
            let Some((alphabet, index)) = locate(c) else {
                return c;
            };
            let size = alphabet_len(alphabet);
            char_at(alphabet, shift(index, offset % size, size)).unwrap_or(c)
        })
        .collect();
    Ok(Password::from_chars(chars))
}

fn alphabet_len(alphabet: Alphabet) -> u32 {
    alphabet.iter().map(|&(lo, hi)| hi - lo + 1).sum()
}

/// The alphabet holding `c` and the position of `c` in it.
fn locate(c: char) -> Option<(Alphabet, u32)> {
    let code = u32::from(c);
    for alphabet in ALPHABETS {
        let mut index = 0;
        for &(lo, hi) in alphabet {
            if (lo..=hi).contains(&code) {
                return Some((alphabet, index + code - lo));
            }
            index += hi - lo + 1;
        }
    }
    None
}

fn char_at(alphabet: Alphabet, mut index: u32) -> Option<char> {
    for &(lo, hi) in alphabet {
        let len = hi - lo + 1;
        if index < len {
            return char::from_u32(lo + index);
        }
        index -= len;
    }
    None
}

/// One 32-bit offset per character position, reduced by the alphabet size
/// at use.
///
/// Block `i` is `HMAC-SHA256(watermark, context || len || i)`, so passwords
/// of different lengths use unrelated streams.
fn keystream(watermark: &Key, len: usize) -> Result<Zeroizing<Vec<u32>>> {
    let len_tag = u32::try_from(len)
        .map_err(|_| VaultError::InvalidInput("password too long to obfuscate".into()))?;
    let mut offsets = Zeroizing::new(Vec::with_capacity(len));
    let mut block: u32 = 0;
    while offsets.len() < len {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(watermark.expose())
            .map_err(|_| VaultError::InvalidInput("invalid watermark key".into()))?;
        mac.update(KEYSTREAM_CONTEXT);
        mac.update(&len_tag.to_le_bytes());
        mac.update(&block.to_le_bytes());
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&mac.finalize().into_bytes());

        let take = (len - offsets.len()).min(OFFSETS_PER_BLOCK);
        for word in bytes.chunks_exact(4).take(take) {
            offsets.push(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        }
        block += 1;
    }
    Ok(offsets)
}
