//! Domain model types for the persistence layer
//!
//! These types are returned by store sessions, decoupled from the
//! storage backend that produced them.

use serde::{Deserialize, Serialize};

use crate::entity::{group_info, user_info};

/// Persisted group record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
}

impl From<group_info::Model> for GroupRecord {
    fn from(model: group_info::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

/// Persisted user record together with the groups it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub groups: Vec<String>,
}

impl UserRecord {
    pub fn from_model(model: user_info::Model, groups: Vec<String>) -> Self {
        Self {
            id: model.id,
            name: model.name,
            groups,
        }
    }
}

/// Full member set of one group, sorted by user id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: String,
    pub members: Vec<String>,
}

impl GroupMembership {
    pub fn new(group_id: &str, mut members: Vec<String>) -> Self {
        members.sort();
        members.dedup();
        Self {
            group_id: group_id.to_string(),
            members,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Selection criteria for a user upsert
///
/// A user created from a change event has nothing but its id, so the
/// placeholder name defaults to the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCriteria {
    pub id: String,
    pub name: Option<String>,
}

impl UserCriteria {
    pub fn by_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Storage backend mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// External database (MySQL/PostgreSQL/SQLite via SeaORM)
    #[default]
    Sql,
    /// In-process tables, for standalone runs and tests
    Memory,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Sql => write!(f, "sql"),
            StorageMode::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(StorageMode::Sql),
            "memory" => Ok(StorageMode::Memory),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}
