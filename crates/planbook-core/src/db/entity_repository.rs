//! Entity repository implementation shared by every planner table

use libsql::{Connection, Row};

use super::rows::{flag, int_value, opt_int, opt_text, text_value};
use crate::error::{Error, Result};
use crate::models::{EntityId, EntityRecord, EntityTable, Fields, LookupIndex, RangeIndex};

const ENTITY_COLUMNS: &str =
    "id, user_id, parent_id, created_at, updated_at, _version, device_id, deleted, sort_order, payload";

// Explicit order first, unordered rows last, newest first among equals.
const ENTITY_ORDER: &str = "sort_order IS NULL, sort_order ASC, created_at DESC, id";

/// Trait for per-table entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Insert a brand new row
    async fn insert(&self, record: &EntityRecord) -> Result<()>;

    /// Get a live (not soft-deleted) entity by ID
    async fn get(&self, id: &EntityId) -> Result<Option<EntityRecord>>;

    /// Get an entity by ID, tombstones included
    async fn get_including_deleted(&self, id: &EntityId) -> Result<Option<EntityRecord>>;

    /// List live entities matching an equality index
    async fn list_by_index(&self, index: LookupIndex, value: &str) -> Result<Vec<EntityRecord>>;

    /// List live entities whose indexed timestamp falls in `[start, end]`
    async fn list_range(&self, index: RangeIndex, start: i64, end: i64)
        -> Result<Vec<EntityRecord>>;

    /// List a user's live entities in display order
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<EntityRecord>> {
        self.list_by_index(LookupIndex::UserId, user_id).await
    }

    /// List the live children of an owning entity in display order
    async fn list_by_parent(&self, parent_id: &EntityId) -> Result<Vec<EntityRecord>> {
        self.list_by_index(LookupIndex::ParentId, &parent_id.as_str())
            .await
    }

    /// List live entities updated inside `[start, end]`, oldest first
    async fn list_updated_between(&self, start: i64, end: i64) -> Result<Vec<EntityRecord>> {
        self.list_range(RangeIndex::UpdatedAt, start, end).await
    }

    /// Persist a local edit: bumps `_version` and refreshes `updated_at`
    async fn save(&self, record: &EntityRecord, device_id: &str) -> Result<EntityRecord>;

    /// Mark an entity deleted, bumping `_version`
    async fn soft_delete(&self, id: &EntityId, device_id: &str) -> Result<EntityRecord>;

    /// Write a resolved remote value exactly as given
    async fn upsert_remote(&self, record: &EntityRecord) -> Result<()>;

    /// Next free position in the `(user_id, parent_id)` ordering scope
    async fn next_order(&self, user_id: &str, parent_id: Option<&EntityId>) -> Result<i64>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
    table: EntityTable,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a repository over one entity table
    pub const fn new(conn: &'a Connection, table: EntityTable) -> Self {
        Self { conn, table }
    }

    /// Parse an entity from a database row selected with `ENTITY_COLUMNS`
    pub(crate) fn parse_record(row: &Row) -> Result<EntityRecord> {
        let id: String = row.get(0)?;
        let payload: String = row.get(9)?;
        Ok(EntityRecord {
            id: parse_id(&id)?,
            user_id: row.get(1)?,
            parent_id: opt_text(row, 2)?.as_deref().map(parse_id).transpose()?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            version: row.get(5)?,
            device_id: row.get(6)?,
            deleted: flag(row, 7)?,
            order: opt_int(row, 8)?,
            fields: serde_json::from_str::<Fields>(&payload)?,
        })
    }

    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<EntityRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn fetch(&self, id: &EntityId, include_deleted: bool) -> Result<Option<EntityRecord>> {
        let filter = if include_deleted { "" } else { " AND deleted = 0" };
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE id = ?{filter}",
            self.table
        );
        Ok(self
            .query_records(&sql, [id.as_str()])
            .await?
            .into_iter()
            .next())
    }
}

fn parse_id(value: &str) -> Result<EntityId> {
    value
        .parse()
        .map_err(|_| Error::Database(format!("Invalid entity id in store: {value}")))
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn insert(&self, record: &EntityRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({ENTITY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        self.conn
            .execute(
                &sql,
                libsql::params![
                    record.id.as_str(),
                    record.user_id.as_str(),
                    text_value(record.parent_id.map(|id| id.as_str())),
                    record.created_at,
                    record.updated_at,
                    record.version,
                    record.device_id.as_str(),
                    i64::from(record.deleted),
                    int_value(record.order),
                    serde_json::to_string(&record.fields)?
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &EntityId) -> Result<Option<EntityRecord>> {
        self.fetch(id, false).await
    }

    async fn get_including_deleted(&self, id: &EntityId) -> Result<Option<EntityRecord>> {
        self.fetch(id, true).await
    }

    async fn list_by_index(&self, index: LookupIndex, value: &str) -> Result<Vec<EntityRecord>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE {} = ? AND deleted = 0 ORDER BY {ENTITY_ORDER}",
            self.table,
            index.column()
        );
        self.query_records(&sql, [value]).await
    }

    async fn list_range(
        &self,
        index: RangeIndex,
        start: i64,
        end: i64,
    ) -> Result<Vec<EntityRecord>> {
        let column = index.column();
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE {column} >= ? AND {column} <= ? AND deleted = 0
             ORDER BY {column} ASC, id",
            self.table
        );
        self.query_records(&sql, libsql::params![start, end]).await
    }

    async fn save(&self, record: &EntityRecord, device_id: &str) -> Result<EntityRecord> {
        let existing = self
            .get_including_deleted(&record.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{}", self.table, record.id)))?;

        let now = chrono::Utc::now().timestamp_millis();
        let saved = EntityRecord {
            created_at: existing.created_at,
            updated_at: now.max(existing.updated_at),
            version: existing.version.max(record.version) + 1,
            device_id: device_id.to_string(),
            ..record.clone()
        };
        self.upsert_remote(&saved).await?;
        Ok(saved)
    }

    async fn soft_delete(&self, id: &EntityId, device_id: &str) -> Result<EntityRecord> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{id}", self.table)))?;
        record.deleted = true;
        self.save(&record, device_id).await
    }

    async fn upsert_remote(&self, record: &EntityRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({ENTITY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 parent_id = excluded.parent_id,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at,
                 _version = excluded._version,
                 device_id = excluded.device_id,
                 deleted = excluded.deleted,
                 sort_order = excluded.sort_order,
                 payload = excluded.payload",
            self.table
        );
        self.conn
            .execute(
                &sql,
                libsql::params![
                    record.id.as_str(),
                    record.user_id.as_str(),
                    text_value(record.parent_id.map(|id| id.as_str())),
                    record.created_at,
                    record.updated_at,
                    record.version,
                    record.device_id.as_str(),
                    i64::from(record.deleted),
                    int_value(record.order),
                    serde_json::to_string(&record.fields)?
                ],
            )
            .await?;
        Ok(())
    }

    async fn next_order(&self, user_id: &str, parent_id: Option<&EntityId>) -> Result<i64> {
        let sql = format!(
            "SELECT MAX(sort_order) FROM {} WHERE user_id = ? AND parent_id IS ? AND deleted = 0",
            self.table
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                libsql::params![user_id, text_value(parent_id.map(EntityId::as_str))],
            )
            .await?;
        let max = match rows.next().await? {
            Some(row) => opt_int(&row, 0)?,
            None => None,
        };
        Ok(max.map_or(0, |max| max + 1))
    }
}
