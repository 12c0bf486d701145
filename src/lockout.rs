//! Counting failed unlock attempts.

use std::sync::atomic::{AtomicU32, Ordering};

/// Outcome of recording one failed unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    /// The user may try again.
    Retry { attempts: u32, max: u32 },
    /// The threshold was reached; the session must be torn down.
    LockedOut { attempts: u32 },
}

/// Consecutive failed unlocks, held in memory only.
///
/// A restarted process starts from zero again. The lockout response (hard
/// logout and removal of re-entry shortcuts) is what makes restarting
/// expensive for an attacker, not the counter itself.
#[derive(Debug)]
pub struct LockoutPolicy {
    threshold: u32,
    failures: AtomicU32,
}

impl LockoutPolicy {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: AtomicU32::new(0),
        }
    }

    pub fn record_failure(&self) -> LockoutStatus {
        let attempts = self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if attempts >= self.threshold {
            LockoutStatus::LockedOut { attempts }
        } else {
            LockoutStatus::Retry {
                attempts,
                max: self.threshold,
            }
        }
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// `"(attempt N of M)"` for the most recent failure.
    pub fn attempt_message(&self) -> String {
        format!("(attempt {} of {})", self.failures(), self.threshold)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
