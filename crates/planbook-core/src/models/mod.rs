//! Data models for Planbook

mod credentials;
mod entity;
mod mutation;
mod query;
mod sync_conflict;

pub use credentials::{CachedIdentity, CachedProfile, OfflineCredentials, CREDENTIALS_ROW_ID};
pub use entity::{EntityId, EntityRecord, EntityTable, Fields};
pub use mutation::{Mutation, MutationKind, SyncQueueEntry};
pub use query::{LookupIndex, RangeIndex};
pub use sync_conflict::{ConflictRecord, ConflictSide, ResolutionReason};
