//! Offline credential cache model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed key of the singleton credentials row
pub const CREDENTIALS_ROW_ID: &str = "current_user";

/// Profile fields cached alongside the verifier so the app can render offline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Salted password verifier for the one user allowed to sign in offline.
///
/// Never holds the password itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCredentials {
    pub user_id: String,
    pub email: String,
    /// Base64 salt
    pub salt: String,
    /// Base64 PBKDF2-HMAC-SHA256 output
    pub derived_key: String,
    /// PBKDF2 rounds used to produce `derived_key`
    pub iterations: u32,
    pub profile: CachedProfile,
    /// Time the row was written (Unix ms)
    pub cached_at: i64,
}

impl OfflineCredentials {
    /// Whether every field needed to verify a password is present
    pub fn is_complete(&self) -> bool {
        !self.user_id.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.salt.is_empty()
            && !self.derived_key.is_empty()
            && self.iterations > 0
    }

    /// Non-secret view of the cached identity
    pub fn identity(&self) -> CachedIdentity {
        CachedIdentity {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            profile: self.profile.clone(),
            cached_at: self.cached_at,
        }
    }
}

impl fmt::Debug for OfflineCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OfflineCredentials")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("salt", &"[REDACTED]")
            .field("derived_key", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .field("profile", &self.profile)
            .field("cached_at", &self.cached_at)
            .finish()
    }
}

/// Who can currently sign in offline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedIdentity {
    pub user_id: String,
    pub email: String,
    pub profile: CachedProfile,
    pub cached_at: i64,
}
