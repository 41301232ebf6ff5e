//! Singleton offline credentials row

use libsql::{Connection, Row};

use crate::error::Result;
use crate::models::{CachedProfile, OfflineCredentials, CREDENTIALS_ROW_ID};

pub struct CredentialsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> CredentialsRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load the cached verifier, if any
    pub async fn load(&self) -> Result<Option<OfflineCredentials>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, email, salt, derived_key, iterations, profile, cached_at
                 FROM offline_credentials WHERE id = ?",
                [CREDENTIALS_ROW_ID],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(parse_credentials(&row)?)),
            None => Ok(None),
        }
    }

    /// Replace the singleton row
    pub async fn save(&self, credentials: &OfflineCredentials) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO offline_credentials
                     (id, user_id, email, salt, derived_key, iterations, profile, cached_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    CREDENTIALS_ROW_ID,
                    credentials.user_id.as_str(),
                    credentials.email.as_str(),
                    credentials.salt.as_str(),
                    credentials.derived_key.as_str(),
                    i64::from(credentials.iterations),
                    serde_json::to_string(&credentials.profile)?,
                    credentials.cached_at
                ],
            )
            .await?;
        Ok(())
    }

    /// Swap the verifier of `user_id`'s row. Returns false when no such row exists.
    pub async fn update_verifier(
        &self,
        user_id: &str,
        salt: &str,
        derived_key: &str,
        iterations: u32,
        cached_at: i64,
    ) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE offline_credentials
                 SET salt = ?, derived_key = ?, iterations = ?, cached_at = ?
                 WHERE id = ? AND user_id = ?",
                libsql::params![
                    salt,
                    derived_key,
                    i64::from(iterations),
                    cached_at,
                    CREDENTIALS_ROW_ID,
                    user_id
                ],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Replace the cached profile of `user_id`'s row, leaving the verifier alone
    pub async fn update_profile(&self, user_id: &str, profile: &CachedProfile) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE offline_credentials SET profile = ? WHERE id = ? AND user_id = ?",
                libsql::params![serde_json::to_string(profile)?, CREDENTIALS_ROW_ID, user_id],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Delete the row. Returns whether one existed.
    pub async fn clear(&self) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM offline_credentials WHERE id = ?",
                [CREDENTIALS_ROW_ID],
            )
            .await?;
        Ok(removed > 0)
    }
}

fn parse_credentials(row: &Row) -> Result<OfflineCredentials> {
    let iterations: i64 = row.get(4)?;
    let profile: String = row.get(5)?;
    Ok(OfflineCredentials {
        user_id: row.get(0)?,
        email: row.get(1)?,
        salt: row.get(2)?,
        derived_key: row.get(3)?,
        // Out-of-range counts become 0, which marks the row incomplete
        iterations: u32::try_from(iterations).unwrap_or_default(),
        profile: serde_json::from_str(&profile)?,
        cached_at: row.get(6)?,
    })
}
