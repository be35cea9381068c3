//! Client configuration.
//!
//! Stored as JSON next to the user's other settings. Secrets never appear
//! here; the provider section only says where the encrypted blob lives.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pearanoid_common::{Error, Result};
use pearanoid_crypto::KdfParams;

/// Default idle period before the session locks itself (10 minutes).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default period between idle checks.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Session lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default)]
    pub kdf: KdfParams,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// # Errors
    /// - `InvalidInput` if the check interval is zero or longer than the
    ///   idle timeout
    /// - `Crypto` if the KDF parameters are below the floor
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.check_interval_secs > self.idle_timeout_secs {
            return Err(Error::InvalidInput(format!(
                "check_interval_secs ({}) must not exceed idle_timeout_secs ({})",
                self.check_interval_secs, self.idle_timeout_secs
            )));
        }
        self.kdf.validate()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            kdf: KdfParams::default(),
        }
    }
}

/// Where the vault lives and how the session behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Storage provider type ("memory", "local", "http").
    pub provider_type: String,
    /// Provider-specific configuration.
    #[serde(default)]
    pub provider_config: serde_json::Value,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(provider_type: impl Into<String>, provider_config: serde_json::Value) -> Self {
        Self {
            provider_type: provider_type.into(),
            provider_config,
            session: SessionConfig::default(),
        }
    }

    /// A local-file vault rooted at `root`.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        Self::new(
            "local",
            serde_json::json!({ "root": root.to_string_lossy() }),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider_type.trim().is_empty() {
            return Err(Error::InvalidInput(
                "provider_type cannot be empty".to_string(),
            ));
        }
        self.session.validate()
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the configuration, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
