use std::path::Path;

use chrono::Utc;
use planbook_core::{EntityRecord, LocalStore};

use crate::commands::common::{
    entity_to_list_item, format_entity_lines, open_store, parse_entity_id, parse_fields,
    parse_table, EntityListItem,
};
use crate::error::CliError;

pub async fn add_entity(
    store: &LocalStore,
    table: &str,
    user_id: &str,
    fields_json: &str,
    parent: Option<&str>,
) -> Result<EntityRecord, CliError> {
    let table = parse_table(table)?;
    let fields = parse_fields(fields_json)?;
    let parent_id = parent.map(parse_entity_id).transpose()?;
    Ok(store.create(table, user_id, parent_id, fields).await?)
}

pub async fn list_entities(
    store: &LocalStore,
    table: &str,
    user_id: &str,
) -> Result<Vec<EntityRecord>, CliError> {
    let table = parse_table(table)?;
    Ok(store.list_by_user(table, user_id).await?)
}

pub async fn delete_entity(
    store: &LocalStore,
    table: &str,
    id: &str,
) -> Result<EntityRecord, CliError> {
    let table = parse_table(table)?;
    let id = parse_entity_id(id)?;
    Ok(store.delete(table, &id).await?)
}

pub async fn run_add(
    table: &str,
    user_id: &str,
    fields_json: &str,
    parent: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let record = add_entity(&store, table, user_id, fields_json, parent).await?;

    println!("{}", record.id);
    Ok(())
}

pub async fn run_list(
    table: &str,
    user_id: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let records = list_entities(&store, table, user_id).await?;

    if as_json {
        let now_ms = Utc::now().timestamp_millis();
        let items = records
            .iter()
            .map(|record| entity_to_list_item(record, now_ms))
            .collect::<Vec<EntityListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_entity_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_delete(table: &str, id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let record = delete_entity(&store, table, id).await?;

    println!("{}", record.id);
    Ok(())
}
