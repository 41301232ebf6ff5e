use std::path::Path;

use planbook_core::models::CachedIdentity;
use planbook_core::LocalStore;
use serde::Serialize;

use crate::commands::common::{format_timestamp, open_store};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub schema_version: u32,
    pub device_id: String,
    pub pending_mutations: u64,
    pub hydration: &'static str,
    pub cached_identity: Option<CachedIdentity>,
}

pub async fn status_report(store: &LocalStore, db_path: &Path) -> Result<StatusReport, CliError> {
    Ok(StatusReport {
        db_path: db_path.display().to_string(),
        schema_version: store.schema_version(),
        device_id: store.device_id().to_string(),
        pending_mutations: store.pending_count().await?,
        hydration: store.hydration_state().as_str(),
        cached_identity: store.cached_identity().await?,
    })
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let identity = report.cached_identity.as_ref().map_or_else(
        || "none".to_string(),
        |identity| {
            format!(
                "{} <{}> (cached {})",
                identity.user_id,
                identity.email,
                format_timestamp(identity.cached_at)
            )
        },
    );
    vec![
        format!("Database:          {}", report.db_path),
        format!("Schema version:    {}", report.schema_version),
        format!("Device:            {}", report.device_id),
        format!("Pending mutations: {}", report.pending_mutations),
        format!("Hydration:         {}", report.hydration),
        format!("Offline identity:  {identity}"),
    ]
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let report = status_report(&store, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }

    Ok(())
}
