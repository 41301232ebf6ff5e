//! Capability interface of the remote backend.
//!
//! The wire protocol is owned by whoever implements [`RemoteStore`]; the
//! core only needs these five operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{EntityId, EntityRecord, EntityTable, LookupIndex, Mutation, RangeIndex};

/// Opaque transport failure reported by a remote backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// No connectivity, timeout, or backend down
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the request (permissions, auth)
    #[error("Remote store refused request: {0}")]
    Refused(String),
    /// The backend answered with something that could not be read
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Backend answer to a pushed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAck {
    /// The backend stored the value
    Accepted,
    /// The backend holds a value with an equal or higher `_version`
    Rejected { current: EntityRecord },
}

/// Change delivered by the backend's realtime channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub table: EntityTable,
    /// New remote value; deletions arrive as tombstones
    pub record: EntityRecord,
}

/// Narrow read/write capability over the remote backend
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Every value of `table` owned by `user_id`, tombstones included
    async fn get_all(&self, table: EntityTable, user_id: &str) -> RemoteResult<Vec<EntityRecord>>;

    async fn get_by_id(
        &self,
        table: EntityTable,
        id: &EntityId,
    ) -> RemoteResult<Option<EntityRecord>>;

    async fn query_by_index(
        &self,
        table: EntityTable,
        index: LookupIndex,
        value: &str,
    ) -> RemoteResult<Vec<EntityRecord>>;

    /// Values whose indexed timestamp falls in `[start, end]`
    async fn query_range(
        &self,
        table: EntityTable,
        index: RangeIndex,
        start: i64,
        end: i64,
    ) -> RemoteResult<Vec<EntityRecord>>;

    /// Transmit one pending mutation
    async fn push(&self, table: EntityTable, mutation: &Mutation) -> RemoteResult<PushAck>;
}
