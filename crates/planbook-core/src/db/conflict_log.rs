//! Append-only history of resolved conflicts

use libsql::{Connection, Row};

use crate::error::{Error, Result};
use crate::models::{ConflictRecord, EntityId, EntityRecord};

const CONFLICT_COLUMNS: &str = "id, entity_id, entity_type, timestamp, winner, reason, \
     local_version, remote_version, local_updated_at, remote_updated_at, discarded";

pub struct ConflictLog<'a> {
    conn: &'a Connection,
}

impl<'a> ConflictLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a conflict, returning its row id. `conflict.id` is ignored.
    pub async fn record(&self, conflict: &ConflictRecord) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO conflict_history
                     (entity_id, entity_type, timestamp, winner, reason, local_version,
                      remote_version, local_updated_at, remote_updated_at, discarded)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    conflict.entity_id.as_str(),
                    conflict.entity_type.as_str(),
                    conflict.timestamp,
                    conflict.winner.as_str(),
                    conflict.reason.as_str(),
                    conflict.local_version,
                    conflict.remote_version,
                    conflict.local_updated_at,
                    conflict.remote_updated_at,
                    serde_json::to_string(&conflict.discarded)?
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Whether `discarded` was already logged for its entity
    pub async fn contains(&self, discarded: &EntityRecord) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM conflict_history WHERE entity_id = ? AND discarded = ?)",
                [discarded.id.as_str(), serde_json::to_string(discarded)?],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? != 0),
            None => Ok(false),
        }
    }

    /// Most recent conflicts first
    pub async fn list(&self, limit: u32) -> Result<Vec<ConflictRecord>> {
        self.query_conflicts(
            &format!(
                "SELECT {CONFLICT_COLUMNS} FROM conflict_history ORDER BY timestamp DESC, id DESC LIMIT ?"
            ),
            [i64::from(limit)],
        )
        .await
    }

    /// Every conflict of one entity, most recent first
    pub async fn list_for_entity(&self, entity_id: &EntityId) -> Result<Vec<ConflictRecord>> {
        self.query_conflicts(
            &format!(
                "SELECT {CONFLICT_COLUMNS} FROM conflict_history WHERE entity_id = ?
                 ORDER BY timestamp DESC, id DESC"
            ),
            [entity_id.as_str()],
        )
        .await
    }

    async fn query_conflicts(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<ConflictRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(parse_conflict(&row)?);
        }
        Ok(conflicts)
    }
}

fn parse_conflict(row: &Row) -> Result<ConflictRecord> {
    let entity_id: String = row.get(1)?;
    let entity_type: String = row.get(2)?;
    let winner: String = row.get(4)?;
    let reason: String = row.get(5)?;
    let discarded: String = row.get(10)?;
    Ok(ConflictRecord {
        id: row.get(0)?,
        entity_id: entity_id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid conflict entity id: {entity_id}")))?,
        entity_type: entity_type.parse()?,
        timestamp: row.get(3)?,
        winner: winner.parse()?,
        reason: reason.parse()?,
        local_version: row.get(6)?,
        remote_version: row.get(7)?,
        local_updated_at: row.get(8)?,
        remote_updated_at: row.get(9)?,
        discarded: serde_json::from_str(&discarded)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ConflictSide, EntityTable, Fields, ResolutionReason};

    fn conflict(discarded: EntityRecord, timestamp: i64) -> ConflictRecord {
        ConflictRecord {
            id: 0,
            entity_id: discarded.id,
            entity_type: EntityTable::Routines,
            timestamp,
            winner: ConflictSide::Remote,
            reason: ResolutionReason::NewerTimestamp,
            local_version: discarded.version,
            remote_version: discarded.version,
            local_updated_at: discarded.updated_at,
            remote_updated_at: discarded.updated_at + 1,
            discarded,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn records_keep_discarded_value() {
        let db = Database::open_in_memory().await.unwrap();
        let log = ConflictLog::new(db.connection());

        let lost = EntityRecord::new("user-1", "a1", Fields::new());
        let first = log.record(&conflict(lost.clone(), 10)).await.unwrap();
        let second = log.record(&conflict(lost.clone(), 20)).await.unwrap();
        assert!(second > first);

        let history = log.list_for_entity(&lost.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second);
        assert_eq!(history[0].discarded, lost);
        assert_eq!(history[0].winner, ConflictSide::Remote);

        assert!(log.contains(&lost).await.unwrap());
        let mut edited = lost.clone();
        edited.version += 1;
        assert!(!log.contains(&edited).await.unwrap());

        let other = EntityRecord::new("user-1", "a1", Fields::new());
        log.record(&conflict(other, 30)).await.unwrap();
        assert_eq!(log.list(2).await.unwrap().len(), 2);
        assert_eq!(log.list(10).await.unwrap().len(), 3);
    }
}
