//! In-memory remote backend for tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::remote::{PushAck, RemoteError, RemoteResult, RemoteStore};
use crate::hydration::HydrationController;
use crate::models::{EntityId, EntityRecord, EntityTable, LookupIndex, Mutation, RangeIndex};

/// Accepts a push only when its `_version` is above the stored one
pub struct FakeRemote {
    rows: Mutex<BTreeMap<(EntityTable, EntityId), EntityRecord>>,
    pushed: Mutex<Vec<EntityTable>>,
    online: AtomicBool,
    reset_on_fetch: Mutex<Option<Arc<HydrationController>>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            pushed: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            reset_on_fetch: Mutex::new(None),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Store a value as if another device had pushed it
    pub fn seed(&self, table: EntityTable, record: EntityRecord) {
        self.rows.lock().unwrap().insert((table, record.id), record);
    }

    pub fn value(&self, table: EntityTable, id: &EntityId) -> Option<EntityRecord> {
        self.rows.lock().unwrap().get(&(table, *id)).cloned()
    }

    /// Tables of accepted pushes, in order
    pub fn pushed_tables(&self) -> Vec<EntityTable> {
        self.pushed.lock().unwrap().clone()
    }

    /// Simulate a sign-out racing the next `get_all`
    pub fn reset_during_fetch(&self, controller: Arc<HydrationController>) {
        *self.reset_on_fetch.lock().unwrap() = Some(controller);
    }

    fn ensure_online(&self) -> RemoteResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("network is unreachable".to_string()))
        }
    }

    fn select(
        &self,
        table: EntityTable,
        predicate: impl Fn(&EntityRecord) -> bool,
    ) -> Vec<EntityRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((row_table, _), record)| *row_table == table && predicate(record))
            .map(|(_, record)| record.clone())
            .collect()
    }
}

impl RemoteStore for FakeRemote {
    async fn get_all(&self, table: EntityTable, user_id: &str) -> RemoteResult<Vec<EntityRecord>> {
        self.ensure_online()?;
        if let Some(controller) = self.reset_on_fetch.lock().unwrap().take() {
            controller.reset();
        }
        Ok(self.select(table, |record| record.user_id == user_id))
    }

    async fn get_by_id(
        &self,
        table: EntityTable,
        id: &EntityId,
    ) -> RemoteResult<Option<EntityRecord>> {
        self.ensure_online()?;
        Ok(self.value(table, id))
    }

    async fn query_by_index(
        &self,
        table: EntityTable,
        index: LookupIndex,
        value: &str,
    ) -> RemoteResult<Vec<EntityRecord>> {
        self.ensure_online()?;
        Ok(self.select(table, |record| match index {
            LookupIndex::UserId => record.user_id == value,
            LookupIndex::ParentId => record.parent_id.is_some_and(|id| id.as_str() == value),
        }))
    }

    async fn query_range(
        &self,
        table: EntityTable,
        index: RangeIndex,
        start: i64,
        end: i64,
    ) -> RemoteResult<Vec<EntityRecord>> {
        self.ensure_online()?;
        Ok(self.select(table, |record| {
            let at = match index {
                RangeIndex::CreatedAt => record.created_at,
                RangeIndex::UpdatedAt => record.updated_at,
            };
            (start..=end).contains(&at)
        }))
    }

    async fn push(&self, table: EntityTable, mutation: &Mutation) -> RemoteResult<PushAck> {
        self.ensure_online()?;
        let incoming = &mutation.record;
        let mut rows = self.rows.lock().unwrap();
        if let Some(current) = rows.get(&(table, incoming.id)) {
            if incoming.version <= current.version {
                return Ok(PushAck::Rejected {
                    current: current.clone(),
                });
            }
        }
        rows.insert((table, incoming.id), incoming.clone());
        self.pushed.lock().unwrap().push(table);
        Ok(PushAck::Accepted)
    }
}
