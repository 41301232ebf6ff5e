//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Database wrapper for the local libSQL store
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
    schema_version: u32,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically. A migration failure is returned as
    /// [`Error::Migration`] and no handle is produced.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;
        let database = Self::initialize(db, conn).await?;
        tracing::debug!(
            "Opened local store at {} (schema v{})",
            path.display(),
            database.schema_version
        );
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;
        Self::initialize(db, conn).await
    }

    async fn initialize(db: LibSqlDatabase, conn: Connection) -> Result<Self> {
        configure(&conn).await?;
        let schema_version = migrations::run(&conn).await?;
        Ok(Self {
            _db: db,
            conn,
            schema_version,
        })
    }

    /// Schema version the store was migrated to
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Identifier of this device, created on first open
    pub async fn device_id(&self) -> Result<String> {
        self.meta_value("device_id")
            .await?
            .ok_or_else(|| Error::Database("device_id missing from local_meta".to_string()))
    }

    /// Replace the persisted device identifier
    pub async fn set_device_id(&self, device_id: &str) -> Result<()> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(Error::InvalidInput("device id must not be empty".into()));
        }
        self.conn
            .execute(
                "INSERT OR REPLACE INTO local_meta (key, value) VALUES ('device_id', ?)",
                [device_id],
            )
            .await?;
        Ok(())
    }

    async fn meta_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM local_meta WHERE key = ?", [key])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Start a write transaction that blocks other writers until [`finish`]
pub(crate) async fn begin(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE TRANSACTION", ()).await?;
    Ok(())
}

/// Commit when `result` is `Ok`, roll back otherwise
pub(crate) async fn finish<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(error) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}

/// Configure `SQLite` pragmas for the local store
async fn configure(conn: &Connection) -> Result<()> {
    // journal_mode returns a row; in-memory databases refuse WAL
    conn.query("PRAGMA journal_mode = WAL;", ()).await.ok();
    conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();
    conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
    conn.execute("PRAGMA busy_timeout = 5000;", ()).await.ok();
    Ok(())
}
