use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::KdfVersion;

pub const DEFAULT_AUTO_LOCK_SECS: u64 = 5 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables shared by both compartments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Personal-vault inactivity timeout. 0 disables auto-lock.
    #[serde(default = "default_auto_lock_secs")]
    pub auto_lock_secs: u64,
    /// Version used for new records and for upgrades.
    #[serde(default)]
    pub kdf_version: KdfVersion,
    /// Re-key records sealed with an older version after a successful unlock.
    #[serde(default = "default_true")]
    pub upgrade_kdf_on_unlock: bool,
    /// Keep the personal-vault key in ephemeral storage between reloads.
    #[serde(default = "default_true")]
    pub persist_session: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            auto_lock_secs: DEFAULT_AUTO_LOCK_SECS,
            kdf_version: KdfVersion::CURRENT,
            upgrade_kdf_on_unlock: true,
            persist_session: true,
        }
    }
}

impl VaultConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn auto_lock_after(&self) -> Option<Duration> {
        match self.auto_lock_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_auto_lock_secs() -> u64 {
    DEFAULT_AUTO_LOCK_SECS
}

fn default_true() -> bool {
    true
}
