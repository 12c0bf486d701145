//! Engine configuration.
//!
//! Every field is optional in the JSON file and falls back to its default.
//! Unknown keys are rejected so a typo does not silently weaken the policy.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Argon2id cost used when a vault is created.
    #[serde(default)]
    pub kdf: KdfParams,

    /// Failed unlocks in a row before the session is torn down.
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,

    /// Idle seconds before an unlocked session locks itself.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Lock as soon as the host reports it went to the background.
    #[serde(default = "default_lock_on_background")]
    pub lock_on_background: bool,

    #[serde(default = "default_min_pin_len")]
    pub min_pin_len: usize,

    /// Refuse to create a vault without hardware-backed wrapping keys. Neither
    /// the software store nor the OS credential store qualifies.
    #[serde(default)]
    pub require_hardware: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            max_login_attempts: default_max_login_attempts(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            lock_on_background: default_lock_on_background(),
            min_pin_len: default_min_pin_len(),
            require_hardware: false,
        }
    }
}

fn default_max_login_attempts() -> u32 {
    3
}

fn default_inactivity_timeout_secs() -> u64 {
    300
}

fn default_lock_on_background() -> bool {
    true
}

fn default_min_pin_len() -> usize {
    4
}

impl Config {
    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()?;
        if self.max_login_attempts == 0 {
            return Err(VaultError::InvalidInput(
                "max_login_attempts must be >= 1".into(),
            ));
        }
        if self.min_pin_len == 0 {
            return Err(VaultError::InvalidInput("min_pin_len must be >= 1".into()));
        }
        Ok(())
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}
