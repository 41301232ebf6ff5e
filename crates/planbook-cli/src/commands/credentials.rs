use std::path::Path;

use planbook_core::auth::CredentialVerification;
use planbook_core::models::CachedIdentity;
use planbook_core::LocalStore;

use crate::commands::common::{format_timestamp, open_store};
use crate::error::CliError;

/// Verify an offline sign-in, turning a refusal into its guidance error
pub async fn verify_offline_sign_in(
    store: &LocalStore,
    expected_user: Option<&str>,
    email: &str,
    password: &str,
) -> Result<CachedIdentity, CliError> {
    match store
        .verify_credentials(expected_user, email, password)
        .await?
    {
        CredentialVerification::Valid(identity) => Ok(identity),
        CredentialVerification::Invalid(failure) => Err(CliError::Credentials(failure)),
    }
}

pub fn format_identity(identity: &CachedIdentity) -> String {
    let name = identity
        .profile
        .display_name
        .as_deref()
        .map_or_else(String::new, |name| format!(" \"{name}\""));
    format!(
        "{}{} <{}> cached {}",
        identity.user_id,
        name,
        identity.email,
        format_timestamp(identity.cached_at)
    )
}

pub async fn run_credentials_status(db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    match store.cached_identity().await? {
        Some(identity) => println!("{}", format_identity(&identity)),
        None => println!("No offline credentials cached on this device"),
    }
    Ok(())
}

pub async fn run_credentials_verify(
    email: &str,
    password: &str,
    expected_user: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let identity = verify_offline_sign_in(&store, expected_user, email, password).await?;
    println!("Offline sign-in accepted for {}", format_identity(&identity));
    Ok(())
}

pub async fn run_credentials_clear(db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    if store.clear_credentials().await? {
        println!("Offline credentials cleared");
    } else {
        println!("No offline credentials cached on this device");
    }
    Ok(())
}
