//! Moves data between the local store and a [`RemoteStore`].
//!
//! Every remote value goes through [`resolve`] before it touches the store.
//! The database lock is only taken between network calls, never across one.

use std::future::Future;

use libsql::Connection;
use serde::Serialize;
use tokio::sync::mpsc;

use super::remote::{PushAck, RemoteChange, RemoteResult, RemoteStore};
use super::resolver::{resolve, Resolution};
use crate::db::{begin, finish, ConflictLog, EntityRepository, LibSqlEntityRepository, SyncQueue};
use crate::error::{Error, Result};
use crate::hydration::HydrationTicket;
use crate::models::{
    ConflictRecord, EntityId, EntityRecord, EntityTable, LookupIndex, Mutation, MutationKind,
    RangeIndex, SyncQueueEntry,
};
use crate::services::LocalStore;
use crate::util::{compact_text, unix_millis_now};

/// Options for engine reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Before hydration, fetch and merge remote data before answering
    pub remote_fallback: bool,
}

impl ReadOptions {
    pub const fn with_remote_fallback() -> Self {
        Self {
            remote_fallback: true,
        }
    }
}

/// How far a read result can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Hydrated, or merged with a successful remote fetch
    Authoritative,
    /// Local data only, the session has not been hydrated yet
    Provisional,
}

/// A read result and its freshness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    pub value: T,
    pub freshness: Freshness,
}

/// Outcome of one `drain` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries accepted by the remote
    pub sent: usize,
    /// Entries that hit a transport failure and stay queued
    pub failed: usize,
    /// Rejections that logged a conflict
    pub conflicts: usize,
}

/// Counters of merged remote values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Remote values written locally
    pub applied: usize,
    /// Conflicts logged while merging
    pub conflicts: usize,
}

impl MergeReport {
    fn add(&mut self, outcome: MergeOutcome) {
        self.applied += usize::from(outcome.applied);
        self.conflicts += usize::from(outcome.conflict_logged);
    }
}

/// Result of merging one remote value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The remote value replaced (or created) the local row
    pub applied: bool,
    /// A conflict history entry was appended
    pub conflict_logged: bool,
}

/// Result of a hydration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    Hydrated(MergeReport),
    /// The session ended while fetching; nothing further was written
    Abandoned,
}

/// Synchronises a [`LocalStore`] with one remote backend
pub struct SyncEngine<R> {
    store: LocalStore,
    remote: R,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub const fn new(store: LocalStore, remote: R) -> Self {
        Self { store, remote }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    // ------------------------------------------------------------------
    // Outbox
    // ------------------------------------------------------------------

    /// Push every pending mutation, owner tables first.
    ///
    /// Stops at the first transport failure; that entry and everything after
    /// it stay queued for the next pass.
    pub async fn drain(&self) -> Result<DrainReport> {
        let pending = {
            let db = self.store.database().lock().await;
            SyncQueue::new(db.connection()).pending().await?
        };

        let mut report = DrainReport::default();
        for entry in pending {
            match self.remote.push(entry.table, &entry.mutation()).await {
                Ok(PushAck::Accepted) => {
                    let db = self.store.database().lock().await;
                    SyncQueue::new(db.connection()).acknowledge(&entry).await?;
                    report.sent += 1;
                    tracing::debug!("Pushed {} {}/{}", entry.kind, entry.table, entry.entity_id);
                }
                Ok(PushAck::Rejected { current }) => {
                    if self.settle_rejection(&entry, &current).await? {
                        report.conflicts += 1;
                    }
                }
                Err(error) => {
                    let reason = compact_text(&error.to_string());
                    let db = self.store.database().lock().await;
                    SyncQueue::new(db.connection())
                        .record_failure(&entry, &reason)
                        .await?;
                    report.failed += 1;
                    tracing::warn!(
                        "Transmission of {}/{} failed (attempt {}): {reason}",
                        entry.table,
                        entry.entity_id,
                        entry.attempts + 1
                    );
                    break;
                }
            }
        }

        if report != DrainReport::default() {
            tracing::info!(
                "Drained outbox: {} sent, {} failed, {} conflicts",
                report.sent,
                report.failed,
                report.conflicts
            );
        }
        Ok(report)
    }

    /// The remote refused an entry because it holds an equal or newer version.
    ///
    /// A winning remote value replaces the local one and the entry is
    /// dropped. A remote copy with the same content counts as delivered. A
    /// winning local value is re-based above the remote version and queued
    /// again. Returns whether a conflict was logged.
    async fn settle_rejection(&self, entry: &SyncQueueEntry, current: &EntityRecord) -> Result<bool> {
        let db = self.store.database().lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            let repo = LibSqlEntityRepository::new(conn, entry.table);
            let queue = SyncQueue::new(conn);
            let local = repo
                .get_including_deleted(&entry.entity_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{}/{}", entry.table, entry.entity_id)))?;

            let resolution = resolve(&local, current);
            let logged = if resolution.diverged {
                log_conflict(conn, entry.table, &local, current, resolution).await?
            } else {
                false
            };

            if resolution.remote_wins() {
                repo.upsert_remote(current).await?;
                queue.remove_for(entry.table, &entry.entity_id).await?;
            } else if !resolution.diverged {
                // Delivered earlier; only the acknowledgement went missing.
                queue.acknowledge(entry).await?;
                tracing::debug!(
                    "Remote already holds {}/{}; acknowledged",
                    entry.table,
                    entry.entity_id
                );
            } else {
                let rebase = EntityRecord {
                    version: current.version,
                    ..local
                };
                let saved = repo.save(&rebase, self.store.device_id()).await?;
                let kind = if saved.deleted {
                    MutationKind::Delete
                } else {
                    MutationKind::Update
                };
                queue.enqueue(entry.table, &Mutation::new(kind, saved)).await?;
            }
            Ok::<_, Error>(logged)
        }
        .await;
        finish(conn, result).await
    }

    // ------------------------------------------------------------------
    // Remote values
    // ------------------------------------------------------------------

    /// Merge one externally delivered remote value
    pub async fn apply_remote(
        &self,
        table: EntityTable,
        record: &EntityRecord,
    ) -> Result<MergeOutcome> {
        let db = self.store.database().lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = merge_remote(conn, table, record).await;
        finish(conn, result).await
    }

    /// Apply realtime changes until the sending side closes the channel.
    ///
    /// Returns how many changes replaced local values.
    pub async fn run_realtime(&self, mut changes: mpsc::Receiver<RemoteChange>) -> Result<usize> {
        let mut applied = 0;
        while let Some(change) = changes.recv().await {
            if self.apply_remote(change.table, &change.record).await?.applied {
                applied += 1;
            }
        }
        tracing::debug!("Realtime channel closed ({applied} changes applied)");
        Ok(applied)
    }

    /// First complete fetch of the session.
    ///
    /// Each table is merged only while the ticket is still live, so a sign-out
    /// during the fetch leaves the store untouched from that point on.
    pub async fn hydrate(&self, user_id: &str) -> Result<HydrationOutcome> {
        let hydration = self.store.hydration();
        let ticket = hydration.begin();
        let mut report = MergeReport::default();

        for table in EntityTable::ALL {
            let fetched = match self.remote.get_all(table, user_id).await {
                Ok(records) => records,
                Err(error) => {
                    if !hydration.fail(ticket) {
                        return Ok(self.abandoned());
                    }
                    tracing::warn!("Hydration failed while fetching {table}: {error}");
                    return Err(error.into());
                }
            };

            match self.merge_batch(table, &fetched, Some(ticket)).await {
                Ok(Some(batch)) => {
                    report.applied += batch.applied;
                    report.conflicts += batch.conflicts;
                }
                Ok(None) => return Ok(self.abandoned()),
                Err(error) => {
                    hydration.fail(ticket);
                    return Err(error);
                }
            }
        }

        if !hydration.complete(ticket) {
            return Ok(self.abandoned());
        }
        tracing::info!(
            "Hydrated session for {user_id}: {} values applied, {} conflicts",
            report.applied,
            report.conflicts
        );
        Ok(HydrationOutcome::Hydrated(report))
    }

    fn abandoned(&self) -> HydrationOutcome {
        tracing::warn!(
            "Hydration abandoned (session is now {})",
            self.store.hydration_state().as_str()
        );
        HydrationOutcome::Abandoned
    }

    /// Merge a fetched batch in one transaction. `None` means the ticket expired.
    async fn merge_batch(
        &self,
        table: EntityTable,
        records: &[EntityRecord],
        ticket: Option<HydrationTicket>,
    ) -> Result<Option<MergeReport>> {
        let db = self.store.database().lock().await;
        if ticket.is_some_and(|ticket| !self.store.hydration().is_live(ticket)) {
            return Ok(None);
        }

        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            let mut report = MergeReport::default();
            for record in records {
                report.add(merge_remote(conn, table, record).await?);
            }
            Ok::<_, Error>(report)
        }
        .await;
        finish(conn, result).await.map(Some)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All of a user's live values in `table`
    pub async fn get_all(
        &self,
        table: EntityTable,
        user_id: &str,
        options: ReadOptions,
    ) -> Result<Snapshot<Vec<EntityRecord>>> {
        let freshness = self
            .refresh(table, options, || self.remote.get_all(table, user_id))
            .await?;
        let value = self.store.list_by_user(table, user_id).await?;
        Ok(Snapshot { value, freshness })
    }

    pub async fn get_by_id(
        &self,
        table: EntityTable,
        id: &EntityId,
        options: ReadOptions,
    ) -> Result<Snapshot<Option<EntityRecord>>> {
        let freshness = self
            .refresh(table, options, || async {
                self.remote
                    .get_by_id(table, id)
                    .await
                    .map(|record| record.into_iter().collect())
            })
            .await?;
        let value = self.store.get(table, id).await?;
        Ok(Snapshot { value, freshness })
    }

    pub async fn query_by_index(
        &self,
        table: EntityTable,
        index: LookupIndex,
        value: &str,
        options: ReadOptions,
    ) -> Result<Snapshot<Vec<EntityRecord>>> {
        let freshness = self
            .refresh(table, options, || {
                self.remote.query_by_index(table, index, value)
            })
            .await?;
        let records = self.store.query_by_index(table, index, value).await?;
        Ok(Snapshot {
            value: records,
            freshness,
        })
    }

    pub async fn query_range(
        &self,
        table: EntityTable,
        index: RangeIndex,
        start: i64,
        end: i64,
        options: ReadOptions,
    ) -> Result<Snapshot<Vec<EntityRecord>>> {
        let freshness = self
            .refresh(table, options, || {
                self.remote.query_range(table, index, start, end)
            })
            .await?;
        let value = self.store.query_range(table, index, start, end).await?;
        Ok(Snapshot { value, freshness })
    }

    async fn refresh<F, Fut>(
        &self,
        table: EntityTable,
        options: ReadOptions,
        fetch: F,
    ) -> Result<Freshness>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RemoteResult<Vec<EntityRecord>>>,
    {
        if self.store.is_hydrated() {
            return Ok(Freshness::Authoritative);
        }
        if !options.remote_fallback {
            return Ok(Freshness::Provisional);
        }

        match fetch().await {
            Ok(records) => {
                self.merge_batch(table, &records, None).await?;
                Ok(Freshness::Authoritative)
            }
            Err(error) => {
                tracing::warn!("Remote fallback for {table} failed, serving local data: {error}");
                Ok(Freshness::Provisional)
            }
        }
    }
}

/// Resolve `remote` against the local row and keep the winner.
///
/// A conflict is logged only when the local side still carries an unsent
/// edit that differs from the remote value.
async fn merge_remote(
    conn: &Connection,
    table: EntityTable,
    remote: &EntityRecord,
) -> Result<MergeOutcome> {
    let repo = LibSqlEntityRepository::new(conn, table);
    let queue = SyncQueue::new(conn);

    let Some(local) = repo.get_including_deleted(&remote.id).await? else {
        repo.upsert_remote(remote).await?;
        return Ok(MergeOutcome {
            applied: true,
            conflict_logged: false,
        });
    };

    let resolution = resolve(&local, remote);
    let pending = queue.pending_for(table, &remote.id).await?.is_some();
    let conflict_logged = if resolution.diverged && pending {
        log_conflict(conn, table, &local, remote, resolution).await?
    } else {
        false
    };

    let applied = resolution.remote_wins();
    if applied {
        repo.upsert_remote(remote).await?;
        if pending {
            queue.remove_for(table, &remote.id).await?;
        }
    }
    Ok(MergeOutcome {
        applied,
        conflict_logged,
    })
}

/// Append a conflict unless this discarded value is already in the history
async fn log_conflict(
    conn: &Connection,
    table: EntityTable,
    local: &EntityRecord,
    remote: &EntityRecord,
    resolution: Resolution,
) -> Result<bool> {
    let log = ConflictLog::new(conn);
    let discarded = resolution.discarded(local, remote);
    if log.contains(discarded).await? {
        return Ok(false);
    }

    log.record(&ConflictRecord {
        id: 0,
        entity_id: local.id,
        entity_type: table,
        timestamp: unix_millis_now(),
        winner: resolution.winner,
        reason: resolution.reason,
        local_version: local.version,
        remote_version: remote.version,
        local_updated_at: local.updated_at,
        remote_updated_at: remote.updated_at,
        discarded: discarded.clone(),
    })
    .await?;
    tracing::warn!(
        "Conflict on {table}/{}: kept {} value ({})",
        local.id,
        resolution.winner,
        resolution.reason.as_str()
    );
    Ok(true)
}
