use std::io;

use planbook_core::auth::CredentialFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] planbook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Entity ID cannot be empty")]
    EmptyEntityId,
    #[error("Invalid entity ID: {0}")]
    InvalidEntityId(String),
    #[error("Fields must be a JSON object, got: {0}")]
    InvalidFields(String),
    #[error("No user given. Pass --user or set `default_user` in {0}")]
    MissingUser(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Offline sign-in refused ({}): {}", .0.as_str(), .0.guidance())]
    Credentials(CredentialFailure),
}

