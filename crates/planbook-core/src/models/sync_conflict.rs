//! Conflict history model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::entity::{EntityId, EntityRecord, EntityTable};
use crate::error::Error;

/// Replica whose value was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSide {
    Local,
    Remote,
}

impl ConflictSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ConflictSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::InvalidInput(format!("Unknown conflict side: {other}"))),
        }
    }
}

/// Rule that decided a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    /// The loser carried a smaller `_version`
    StaleVersion,
    /// Equal versions, later `updated_at` won
    NewerTimestamp,
    /// Equal versions and timestamps, `device_id` ordering decided
    DeviceTiebreak,
    /// Both sides carry the same version, timestamp and device
    Identical,
}

impl ResolutionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaleVersion => "stale_version",
            Self::NewerTimestamp => "newer_timestamp",
            Self::DeviceTiebreak => "device_tiebreak",
            Self::Identical => "identical",
        }
    }
}

impl FromStr for ResolutionReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stale_version" => Ok(Self::StaleVersion),
            "newer_timestamp" => Ok(Self::NewerTimestamp),
            "device_tiebreak" => Ok(Self::DeviceTiebreak),
            "identical" => Ok(Self::Identical),
            other => Err(Error::InvalidInput(format!(
                "Unknown resolution reason: {other}"
            ))),
        }
    }
}

/// Recorded conflict between a local and a remote value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict row identifier
    pub id: i64,
    /// Entity involved in the conflict
    pub entity_id: EntityId,
    /// Table of the entity
    pub entity_type: EntityTable,
    /// Resolution timestamp (unix ms)
    pub timestamp: i64,
    /// Side that was kept
    pub winner: ConflictSide,
    /// Rule that picked the winner
    pub reason: ResolutionReason,
    pub local_version: i64,
    pub remote_version: i64,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
    /// The value that was thrown away, kept for audit and undo
    pub discarded: EntityRecord,
}
