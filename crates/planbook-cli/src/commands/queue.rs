use std::path::Path;

use crate::commands::common::{format_queue_lines, open_store, queue_entry_to_item, QueueItem};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entries = store.pending_mutations().await?;

    if as_json {
        let items = entries
            .iter()
            .map(queue_entry_to_item)
            .collect::<Vec<QueueItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if entries.is_empty() {
        println!("Outbox is empty");
    } else {
        for line in format_queue_lines(&entries) {
            println!("{line}");
        }
    }

    Ok(())
}
