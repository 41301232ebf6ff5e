//! Persistent CLI configuration and database path resolution.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use planbook_core::util::normalize_text_option;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_DIR_NAME: &str = "planbook";
const CONFIG_FILE_NAME: &str = "cli-config.json";
const DB_FILE_NAME: &str = "planbook.db";

pub const DB_PATH_ENV: &str = "PLANBOOK_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub default_user: Option<String>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(DB_FILE_NAME)
}

impl CliConfig {
    /// Load the config at the platform location; missing file means defaults.
    pub fn load() -> Result<Self, CliError> {
        default_config_path().map_or_else(|| Ok(Self::default()), |path| Self::load_from_path(&path))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!("Failed to read config at {}: {error}", path.display()))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!("Failed to parse config at {}: {error}", path.display()))
        })?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        self.default_user = normalize_text_option(self.default_user.take());
        self.db_path = self
            .db_path
            .take()
            .filter(|path| !path.as_os_str().is_empty());
    }

    /// `--db-path`, then `PLANBOOK_DB_PATH`, then the config file, then the data dir
    pub fn resolve_db_path(
        &self,
        cli_db_path: Option<PathBuf>,
        env_db_path: Option<OsString>,
    ) -> PathBuf {
        cli_db_path
            .or_else(|| {
                env_db_path
                    .filter(|value| !value.is_empty())
                    .map(PathBuf::from)
            })
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(default_db_path)
    }

    /// Explicit `--user`, else `default_user`
    pub fn resolve_user(&self, cli_user: Option<String>) -> Result<String, CliError> {
        normalize_text_option(cli_user)
            .or_else(|| self.default_user.clone())
            .ok_or_else(|| {
                CliError::MissingUser(default_config_path().map_or_else(
                    || CONFIG_FILE_NAME.to_string(),
                    |path| path.display().to_string(),
                ))
            })
    }
}
