//! Error types for planbook-core

use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias using planbook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in planbook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A schema migration failed; the store must not be used
    #[error("Schema migration v{version} ({name}) failed: {reason}")]
    Migration {
        version: u32,
        name: &'static str,
        reason: String,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transmission to the remote store failed; pending work stays queued
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Offline credentials could not be persisted intact
    #[error("Offline credential persistence failed: {0}")]
    CredentialPersistence(String),

    /// Key derivation failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the store must refuse to keep running after this error.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Migration { .. } | Self::CredentialPersistence(_))
    }
}
