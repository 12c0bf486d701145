//! Owned secret buffers that wipe themselves on drop.

mod key;
mod password;

pub use key::{Key, Salt};
pub use password::Password;

/// Constant-time comparison of two byte slices.
///
/// Length is not secret; contents are compared without early exit.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
