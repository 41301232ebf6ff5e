//! Pending mutation models for the sync outbox

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::entity::{EntityId, EntityRecord, EntityTable};
use crate::error::Error;

/// Kind of local change waiting to be transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Operation left after `later` coalesces onto `self`.
    ///
    /// A create stays a create until the entity is deleted.
    #[must_use]
    pub const fn coalesce(self, later: Self) -> Self {
        match (self, later) {
            (_, Self::Delete) => Self::Delete,
            (Self::Create, _) => Self::Create,
            (_, later) => later,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown mutation kind: {other}"))),
        }
    }
}

/// A committed local change and the entity state it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub record: EntityRecord,
}

impl Mutation {
    pub const fn new(kind: MutationKind, record: EntityRecord) -> Self {
        Self { kind, record }
    }
}

/// Pending outbox row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    /// Outbox row identifier (FIFO position)
    pub id: i64,
    /// Target table
    pub table: EntityTable,
    /// Entity the change applies to
    pub entity_id: EntityId,
    /// Time of the latest coalesced enqueue (Unix ms)
    pub timestamp: i64,
    /// Merged operation
    pub kind: MutationKind,
    /// Latest local state of the entity
    pub record: EntityRecord,
    /// Bumped every time a newer edit coalesces onto this row
    pub revision: i64,
    /// Failed transmission attempts
    pub attempts: i64,
    /// Most recent transmission error
    pub last_error: Option<String>,
}

impl SyncQueueEntry {
    /// The change to transmit
    pub fn mutation(&self) -> Mutation {
        Mutation::new(self.kind, self.record.clone())
    }
}
