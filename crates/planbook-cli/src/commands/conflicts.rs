use std::path::Path;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, open_store, ConflictItem,
};
use crate::error::CliError;

pub async fn run_conflicts(limit: u32, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if conflicts.is_empty() {
        println!("No sync conflicts recorded");
    } else {
        for line in format_conflict_lines(&conflicts) {
            println!("{line}");
        }
    }

    Ok(())
}
