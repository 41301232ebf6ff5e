//! Entity record model shared by every planner table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Domain payload of an entity (name, description, completion flags, ...)
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A unique identifier for an entity, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new unique entity ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Local tables holding planner entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    GoalLists,
    Goals,
    TaskCategories,
    DailyTasks,
    LongTermTodos,
    Routines,
}

impl EntityTable {
    /// Every table, owners before the tables that reference them.
    pub const ALL: [Self; 6] = [
        Self::GoalLists,
        Self::Goals,
        Self::TaskCategories,
        Self::DailyTasks,
        Self::LongTermTodos,
        Self::Routines,
    ];

    /// SQL table name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoalLists => "goal_lists",
            Self::Goals => "goals",
            Self::TaskCategories => "task_categories",
            Self::DailyTasks => "daily_tasks",
            Self::LongTermTodos => "long_term_todos",
            Self::Routines => "routines",
        }
    }

    /// Table referenced by `parent_id`, if any
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Goals => Some(Self::GoalLists),
            Self::DailyTasks => Some(Self::TaskCategories),
            _ => None,
        }
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown table: {s}")))
    }
}

/// One persisted planner object (goal, task, routine, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Stable identifier shared by local and remote copies
    pub id: EntityId,
    /// Owning user
    pub user_id: String,
    /// Owning entity (goal list of a goal, category of a task)
    pub parent_id: Option<EntityId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), set by the mutating device
    pub updated_at: i64,
    /// Per-record write counter, never decreases
    #[serde(rename = "_version")]
    pub version: i64,
    /// Device that produced the current value
    pub device_id: String,
    /// Soft delete flag for sync
    pub deleted: bool,
    /// Position inside the `(user_id, parent_id)` ordering scope
    pub order: Option<i64>,
    /// Domain payload
    #[serde(default)]
    pub fields: Fields,
}

impl EntityRecord {
    /// Create a fresh record at version 1
    #[must_use]
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>, fields: Fields) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: EntityId::new(),
            user_id: user_id.into(),
            parent_id: None,
            created_at: now,
            updated_at: now,
            version: 1,
            device_id: device_id.into(),
            deleted: false,
            order: None,
            fields,
        }
    }

    /// Attach the owning entity
    #[must_use]
    pub const fn with_parent(mut self, parent_id: EntityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Whether two values carry the same user-visible content.
    ///
    /// Bookkeeping columns (`_version`, `updated_at`, `device_id`) are ignored.
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.user_id == other.user_id
            && self.parent_id == other.parent_id
            && self.deleted == other.deleted
            && self.order == other.order
            && self.fields == other.fields
    }

    /// Read a string field from the payload
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(serde_json::Value::as_str)
    }
}
