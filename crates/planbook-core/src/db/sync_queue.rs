//! Durable outbox of local mutations awaiting transmission

use libsql::{Connection, Row};

use super::rows::opt_text;
use crate::error::{Error, Result};
use crate::models::{EntityId, EntityRecord, EntityTable, Mutation, SyncQueueEntry};

const QUEUE_COLUMNS: &str =
    "id, table_name, entity_id, timestamp, operation, payload, revision, attempts, last_error";

/// Outbox accessor over a borrowed connection
pub struct SyncQueue<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueue<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add a mutation, coalescing with any entry already pending for the entity.
    ///
    /// The first entry keeps its id so the entity keeps its FIFO position.
    /// The merged operation follows [`crate::models::MutationKind::coalesce`].
    pub async fn enqueue(&self, table: EntityTable, mutation: &Mutation) -> Result<()> {
        let payload = serde_json::to_string(&mutation.record)?;
        self.conn
            .execute(
                "INSERT INTO sync_queue
                     (table_name, entity_id, timestamp, operation, payload, revision, attempts)
                 VALUES (?, ?, ?, ?, ?, 1, 0)
                 ON CONFLICT(table_name, entity_id) DO UPDATE SET
                     timestamp = MAX(sync_queue.timestamp, excluded.timestamp),
                     operation = CASE
                         WHEN excluded.operation = 'delete' THEN 'delete'
                         WHEN sync_queue.operation = 'create' THEN 'create'
                         ELSE excluded.operation
                     END,
                     payload = excluded.payload,
                     revision = sync_queue.revision + 1",
                libsql::params![
                    table.as_str(),
                    mutation.record.id.as_str(),
                    chrono::Utc::now().timestamp_millis(),
                    mutation.kind.as_str(),
                    payload
                ],
            )
            .await?;
        tracing::debug!(
            "Queued {} for {}/{}",
            mutation.kind,
            table,
            mutation.record.id
        );
        Ok(())
    }

    /// Pending entries, owner tables first, FIFO within a table
    pub async fn pending(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut entries = self
            .query_entries(&format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY id"), ())
            .await?;
        entries.sort_by_key(|entry| table_rank(entry.table));
        Ok(entries)
    }

    /// The entry pending for one entity, if any
    pub async fn pending_for(
        &self,
        table: EntityTable,
        entity_id: &EntityId,
    ) -> Result<Option<SyncQueueEntry>> {
        Ok(self
            .query_entries(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE table_name = ? AND entity_id = ?"
                ),
                [table.as_str().to_string(), entity_id.as_str()],
            )
            .await?
            .into_iter()
            .next())
    }

    /// Remove a transmitted entry unless a newer edit coalesced onto it.
    ///
    /// Returns whether the entry was removed.
    pub async fn acknowledge(&self, entry: &SyncQueueEntry) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE id = ? AND revision = ?",
                libsql::params![entry.id, entry.revision],
            )
            .await?;
        if removed == 0 {
            tracing::debug!(
                "Kept {}/{}: edited while in flight",
                entry.table,
                entry.entity_id
            );
        }
        Ok(removed > 0)
    }

    /// Record a failed transmission; the entry stays queued
    pub async fn record_failure(&self, entry: &SyncQueueEntry, reason: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue SET attempts = attempts + 1, last_error = ? WHERE id = ?",
                libsql::params![reason, entry.id],
            )
            .await?;
        Ok(())
    }

    /// Drop whatever is pending for an entity
    pub async fn remove_for(&self, table: EntityTable, entity_id: &EntityId) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE table_name = ? AND entity_id = ?",
                [table.as_str().to_string(), entity_id.as_str()],
            )
            .await?;
        Ok(removed > 0)
    }

    /// Number of pending entries
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM sync_queue", ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncQueueEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(parse_entry(&row)?);
        }
        Ok(entries)
    }
}

fn table_rank(table: EntityTable) -> usize {
    EntityTable::ALL
        .iter()
        .position(|candidate| *candidate == table)
        .unwrap_or(EntityTable::ALL.len())
}

fn parse_entry(row: &Row) -> Result<SyncQueueEntry> {
    let table: String = row.get(1)?;
    let entity_id: String = row.get(2)?;
    let operation: String = row.get(4)?;
    let payload: String = row.get(5)?;
    Ok(SyncQueueEntry {
        id: row.get(0)?,
        table: table.parse()?,
        entity_id: entity_id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid queued entity id: {entity_id}")))?,
        timestamp: row.get(3)?,
        kind: operation.parse()?,
        record: serde_json::from_str::<EntityRecord>(&payload)?,
        revision: row.get(6)?,
        attempts: row.get(7)?,
        last_error: opt_text(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Fields, MutationKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(name: &str) -> EntityRecord {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!(name));
        EntityRecord::new("user-1", "a1", fields)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_update_coalesces_to_one_create() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());

        let mut goal = record("draft");
        queue
            .enqueue(EntityTable::Goals, &Mutation::new(MutationKind::Create, goal.clone()))
            .await
            .unwrap();
        goal.fields.insert("name".to_string(), json!("final"));
        goal.version = 2;
        queue
            .enqueue(EntityTable::Goals, &Mutation::new(MutationKind::Update, goal.clone()))
            .await
            .unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Create);
        assert_eq!(pending[0].record, goal);
        assert_eq!(pending[0].revision, 2);
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stored_merge_matches_coalesce_rule() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());
        let kinds = [MutationKind::Create, MutationKind::Update, MutationKind::Delete];

        for first in kinds {
            for later in kinds {
                let goal = record("x");
                queue
                    .enqueue(EntityTable::Goals, &Mutation::new(first, goal.clone()))
                    .await
                    .unwrap();
                queue
                    .enqueue(EntityTable::Goals, &Mutation::new(later, goal.clone()))
                    .await
                    .unwrap();
                let entry = queue
                    .pending_for(EntityTable::Goals, &goal.id)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(entry.kind, first.coalesce(later), "{first} then {later}");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_puts_owner_tables_first() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());

        let task = record("task");
        let category = record("category");
        let list = record("list");
        queue
            .enqueue(EntityTable::DailyTasks, &Mutation::new(MutationKind::Create, task.clone()))
            .await
            .unwrap();
        queue
            .enqueue(
                EntityTable::TaskCategories,
                &Mutation::new(MutationKind::Create, category.clone()),
            )
            .await
            .unwrap();
        queue
            .enqueue(EntityTable::GoalLists, &Mutation::new(MutationKind::Create, list.clone()))
            .await
            .unwrap();

        let order = queue
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.table)
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                EntityTable::GoalLists,
                EntityTable::TaskCategories,
                EntityTable::DailyTasks
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn acknowledge_keeps_entry_edited_in_flight() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());

        let goal = record("a");
        queue
            .enqueue(EntityTable::Goals, &Mutation::new(MutationKind::Create, goal.clone()))
            .await
            .unwrap();
        let in_flight = queue.pending().await.unwrap().remove(0);

        queue
            .enqueue(EntityTable::Goals, &Mutation::new(MutationKind::Update, goal.clone()))
            .await
            .unwrap();
        assert!(!queue.acknowledge(&in_flight).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 1);

        let latest = queue.pending().await.unwrap().remove(0);
        assert_eq!(latest.id, in_flight.id);
        assert!(queue.acknowledge(&latest).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_are_recorded_and_entry_kept() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());

        let goal = record("a");
        queue
            .enqueue(EntityTable::Goals, &Mutation::new(MutationKind::Create, goal.clone()))
            .await
            .unwrap();
        let entry = queue.pending().await.unwrap().remove(0);
        queue.record_failure(&entry, "offline").await.unwrap();
        queue.record_failure(&entry, "timeout").await.unwrap();

        let entry = queue.pending().await.unwrap().remove(0);
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.last_error.as_deref(), Some("timeout"));

        assert!(queue.remove_for(EntityTable::Goals, &goal.id).await.unwrap());
        assert!(queue.pending().await.unwrap().is_empty());
    }
}
