use std::path::Path;

use chrono::Utc;
use planbook_core::models::{ConflictRecord, Fields, SyncQueueEntry};
use planbook_core::{EntityId, EntityRecord, EntityTable, LocalStore, StoreConfig};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct EntityListItem {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub order: Option<i64>,
    pub version: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub fields: Fields,
}

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub id: i64,
    pub table: String,
    pub entity_id: String,
    pub operation: String,
    pub timestamp: i64,
    pub attempts: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub entity_id: String,
    pub entity_type: String,
    pub winner: String,
    pub reason: String,
    pub local_version: i64,
    pub remote_version: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub discarded: EntityRecord,
}

pub async fn open_store(path: &Path) -> Result<LocalStore, CliError> {
    let config = StoreConfig::from_env()?;
    Ok(LocalStore::open(path, config).await?)
}

pub fn parse_table(value: &str) -> Result<EntityTable, CliError> {
    Ok(value.parse::<EntityTable>()?)
}

pub fn parse_entity_id(value: &str) -> Result<EntityId, CliError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CliError::EmptyEntityId);
    }
    value
        .parse::<EntityId>()
        .map_err(|_| CliError::InvalidEntityId(value.to_string()))
}

pub fn parse_fields(raw: &str) -> Result<Fields, CliError> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(CliError::InvalidFields(other.to_string())),
    }
}

/// Display title of an entity: `name`, then `title`, then a placeholder
pub fn entity_title(record: &EntityRecord) -> String {
    record
        .field_str("name")
        .or_else(|| record.field_str("title"))
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map_or_else(|| "(untitled)".to_string(), ToString::to_string)
}

pub fn entity_to_list_item(record: &EntityRecord, now_ms: i64) -> EntityListItem {
    EntityListItem {
        id: record.id.to_string(),
        parent_id: record.parent_id.map(|id| id.to_string()),
        title: entity_title(record),
        order: record.order,
        version: record.version,
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
        fields: record.fields.clone(),
    }
}

pub fn format_entity_lines(records: &[EntityRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let position = record
                .order
                .map_or_else(|| "-".to_string(), |order| order.to_string());
            format!(
                "{:>3}  {}  {}  v{} ({})",
                position,
                short_id(&record.id.to_string()),
                entity_title(record),
                record.version,
                format_relative_time(record.updated_at, now_ms)
            )
        })
        .collect()
}

pub fn queue_entry_to_item(entry: &SyncQueueEntry) -> QueueItem {
    QueueItem {
        id: entry.id,
        table: entry.table.to_string(),
        entity_id: entry.entity_id.to_string(),
        operation: entry.kind.as_str().to_string(),
        timestamp: entry.timestamp,
        attempts: entry.attempts,
        last_error: entry.last_error.clone(),
    }
}

pub fn format_queue_lines(entries: &[SyncQueueEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "{}  {:<6}  {}/{}",
                format_timestamp(entry.timestamp),
                entry.kind.as_str(),
                entry.table,
                short_id(&entry.entity_id.to_string())
            );
            if entry.attempts > 0 {
                line.push_str(&format!("  attempts={}", entry.attempts));
            }
            if let Some(error) = &entry.last_error {
                line.push_str(&format!("  last_error={error}"));
            }
            line
        })
        .collect()
}

pub fn conflict_to_item(conflict: &ConflictRecord) -> ConflictItem {
    ConflictItem {
        id: conflict.id,
        entity_id: conflict.entity_id.to_string(),
        entity_type: conflict.entity_type.to_string(),
        winner: conflict.winner.as_str().to_string(),
        reason: conflict.reason.as_str().to_string(),
        local_version: conflict.local_version,
        remote_version: conflict.remote_version,
        resolved_at: conflict.timestamp,
        resolved_at_iso: format_timestamp(conflict.timestamp),
        discarded: conflict.discarded.clone(),
    }
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<6}  {}/{}  reason={}  local=v{} remote=v{}",
                format_timestamp(conflict.timestamp),
                conflict.winner.as_str(),
                conflict.entity_type,
                short_id(&conflict.entity_id.to_string()),
                conflict.reason.as_str(),
                conflict.local_version,
                conflict.remote_version
            )
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
