use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::constant_time_eq;
use crate::error::{Result, VaultError};

/// A human-entered secret held as a mutable character buffer.
///
/// Every mutation that reallocates wipes the old buffer first, and the
/// contents are zeroed on drop.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Password {
    chars: Vec<char>,
}

impl Password {
    pub fn new(secret: &str) -> Self {
        Password {
            chars: secret.chars().collect(),
        }
    }

    pub fn from_chars(chars: Vec<char>) -> Self {
        Password { chars }
    }

    /// Decodes UTF-8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| VaultError::InvalidInput("password is not valid UTF-8".into()))?;
        Ok(Self::new(text))
    }

    /// UTF-8 encoding of the password in a buffer that is wiped on drop.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(self.chars.len() * 4));
        let mut buf = [0u8; 4];
        for c in &self.chars {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        buf.zeroize();
        out
    }

    /// Reveals the password as a string for display or hand-off.
    pub fn expose(&self) -> Zeroizing<String> {
        Zeroizing::new(self.chars.iter().collect())
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn push(&mut self, c: char) {
        self.reserve(1);
        self.chars.push(c);
    }

    /// Appends `other` and clears it.
    pub fn append(&mut self, other: &mut Password) {
        self.reserve(other.len());
        self.chars.extend_from_slice(&other.chars);
        other.clear();
    }

    /// Overwrites the buffer with zeros and empties it.
    pub fn clear(&mut self) {
        self.chars.zeroize();
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Constant-time equality, for authentication checks.
    pub fn ct_eq(&self, other: &Password) -> bool {
        constant_time_eq(&self.to_bytes(), &other.to_bytes())
    }

    /// Renders the password in dash separated groups, e.g. `abcd-efgh-ij`.
    pub fn grouped(&self, group: usize) -> Zeroizing<String> {
        let group = group.max(1);
        let mut out = Zeroizing::new(String::with_capacity(self.chars.len() * 2));
        for (i, c) in self.chars.iter().enumerate() {
            if i != 0 && i % group == 0 {
                out.push('-');
            }
            out.push(*c);
        }
        out
    }

    // Grow by moving into a fresh allocation so the old one can be wiped,
    // instead of letting Vec reallocate and leave a copy behind.
    fn reserve(&mut self, additional: usize) {
        if self.chars.capacity() - self.chars.len() >= additional {
            return;
        }
        let mut grown = Vec::with_capacity((self.chars.len() + additional).max(16) * 2);
        grown.extend_from_slice(&self.chars);
        self.chars.zeroize();
        self.chars = grown;
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Password::new(value)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED; {}])", self.chars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_clears_other() {
        let mut a = Password::new("1234");
        let mut b = Password::new("abcd");
        a.append(&mut b);
        assert_eq!(a.expose().as_str(), "1234abcd");
        assert!(b.is_empty());
    }

    #[test]
    fn push_and_len() {
        let mut p = Password::default();
        for c in "hunter2".chars() {
            p.push(c);
        }
        assert_eq!(p.len(), 7);
        assert_eq!(p.expose().as_str(), "hunter2");
    }

    #[test]
    fn clear_empties_buffer() {
        let mut p = Password::new("secret");
        p.clear();
        assert!(p.is_empty());
    }

    #[test]
    fn bytes_roundtrip_utf8() {
        let p = Password::new("pässwörd€");
        let back = Password::from_bytes(&p.to_bytes()).unwrap();
        assert!(p.ct_eq(&back));
        assert!(Password::from_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn ct_eq_detects_difference() {
        assert!(Password::new("abc").ct_eq(&Password::new("abc")));
        assert!(!Password::new("abc").ct_eq(&Password::new("abd")));
        assert!(!Password::new("abc").ct_eq(&Password::new("abcd")));
    }

    #[test]
    fn grouped_presentation() {
        let p = Password::new("abcdefghij");
        assert_eq!(p.grouped(4).as_str(), "abcd-efgh-ij");
        assert_eq!(Password::new("abcd").grouped(4).as_str(), "abcd");
    }

    #[test]
    fn debug_hides_content() {
        let p = Password::new("secret");
        assert_eq!(format!("{p:?}"), "Password([REDACTED; 6])");
    }
}
