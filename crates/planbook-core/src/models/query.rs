//! Index selectors shared by local and remote queries

use serde::{Deserialize, Serialize};

/// Equality-lookup index of an entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupIndex {
    UserId,
    ParentId,
}

impl LookupIndex {
    pub const fn column(self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::ParentId => "parent_id",
        }
    }
}

/// Range-query index of an entity table (Unix ms values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeIndex {
    CreatedAt,
    UpdatedAt,
}

impl RangeIndex {
    pub const fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}
