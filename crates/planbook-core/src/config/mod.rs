//! Runtime configuration for the local store.
//!
//! Values come from code defaults, optionally overridden by environment
//! variables. Nothing here is secret.

use serde::{Deserialize, Serialize};

use crate::auth::DEFAULT_KDF_ITERATIONS;
use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// Environment variable overriding [`StoreConfig::kdf_iterations`]
pub const KDF_ITERATIONS_ENV: &str = "PLANBOOK_KDF_ITERATIONS";
/// Environment variable overriding [`StoreConfig::device_id`]
pub const DEVICE_ID_ENV: &str = "PLANBOOK_DEVICE_ID";

/// Store-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// PBKDF2 rounds used for newly cached credentials
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    /// Pin the device identity instead of the one generated on first open
    #[serde(default)]
    pub device_id: Option<String>,
}

const fn default_kdf_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            device_id: None,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `PLANBOOK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = normalize_text_option(lookup(KDF_ITERATIONS_ENV)) {
            config.kdf_iterations = raw.parse().map_err(|_| {
                Error::Config(format!("{KDF_ITERATIONS_ENV} must be a positive integer"))
            })?;
        }
        config.device_id = normalize_text_option(lookup(DEVICE_ID_ENV));

        config.validate()?;
        Ok(config)
    }

    /// Reject values the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(Error::Config(
                "kdf_iterations must be greater than zero".to_string(),
            ));
        }
        if self
            .device_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(Error::Config("device_id must not be blank".to_string()));
        }
        Ok(())
    }
}
