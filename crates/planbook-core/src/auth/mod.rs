//! Offline sign-in support.
//!
//! Only a salted PBKDF2-HMAC-SHA256 verifier of the password is ever stored.
//! Derivation is CPU heavy and runs on the blocking pool.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::models::{CachedIdentity, OfflineCredentials};

/// PBKDF2 rounds for newly written verifiers
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
/// Random salt length in bytes
pub const SALT_LEN: usize = 16;
/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

/// Base64-encoded salt and derived key
#[derive(Clone, PartialEq, Eq)]
pub struct Verifier {
    pub salt: String,
    pub derived_key: String,
    pub iterations: u32,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Verifier")
            .field("salt", &"[REDACTED]")
            .field("derived_key", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// Why an offline sign-in was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    /// Nothing is cached on this device
    NoCredentials,
    /// The cache belongs to a different account
    UserMismatch,
    /// The email does not match the cached account
    EmailMismatch,
    /// Wrong password
    PasswordMismatch,
}

impl CredentialFailure {
    /// Message shown to the user for this failure
    pub const fn guidance(self) -> &'static str {
        match self {
            Self::NoCredentials => {
                "Offline sign-in is not set up on this device. Connect to the internet and sign in once."
            }
            Self::UserMismatch => {
                "Only the account that last signed in online can sign in offline on this device."
            }
            Self::EmailMismatch => "This email does not match the account saved for offline use.",
            Self::PasswordMismatch => {
                "Incorrect password. If you changed it recently, sign in online to refresh it."
            }
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoCredentials => "no_credentials",
            Self::UserMismatch => "user_mismatch",
            Self::EmailMismatch => "email_mismatch",
            Self::PasswordMismatch => "password_mismatch",
        }
    }
}

/// Result of an offline sign-in attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialVerification {
    Valid(CachedIdentity),
    Invalid(CredentialFailure),
}

impl CredentialVerification {
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Options for [`crate::services::LocalStore::sign_out`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignOutOptions {
    /// Keep the offline verifier so the same user can sign back in offline
    pub preserve_offline_credentials: bool,
}

/// Fresh random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// PBKDF2-HMAC-SHA256 of `password`
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Derive a verifier for `password` under a new salt
pub async fn derive_verifier(password: String, iterations: u32) -> Result<Verifier> {
    if iterations == 0 {
        return Err(Error::Crypto("iteration count must be positive".to_string()));
    }
    tokio::task::spawn_blocking(move || {
        let salt = generate_salt();
        let key = derive_key(&password, &salt, iterations);
        Verifier {
            salt: B64.encode(salt),
            derived_key: B64.encode(key),
            iterations,
        }
    })
    .await
    .map_err(|error| Error::Crypto(format!("key derivation task failed: {error}")))
}

/// Whether `password` reproduces the cached verifier
pub async fn password_matches(password: String, credentials: &OfflineCredentials) -> Result<bool> {
    let salt = B64
        .decode(&credentials.salt)
        .map_err(|error| Error::Crypto(format!("invalid cached salt: {error}")))?;
    let expected = B64
        .decode(&credentials.derived_key)
        .map_err(|error| Error::Crypto(format!("invalid cached key: {error}")))?;
    let iterations = credentials.iterations;

    let derived = tokio::task::spawn_blocking(move || derive_key(&password, &salt, iterations))
        .await
        .map_err(|error| Error::Crypto(format!("key derivation task failed: {error}")))?;

    Ok(constant_time_eq(&derived, &expected))
}

/// Compare without an early exit on the first differing byte
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
