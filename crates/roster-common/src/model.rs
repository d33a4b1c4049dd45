//! Change channel and operation identifiers

use serde::{Deserialize, Serialize};

/// Logical change channels the sync engine subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeChannel {
    Group,
    User,
    Membership,
}

impl ChangeChannel {
    pub const ALL: [ChangeChannel; 3] = [
        ChangeChannel::Group,
        ChangeChannel::User,
        ChangeChannel::Membership,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeChannel::Group => "group",
            ChangeChannel::User => "user",
            ChangeChannel::Membership => "membership",
        }
    }
}

impl std::fmt::Display for ChangeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(ChangeChannel::Group),
            "user" => Ok(ChangeChannel::User),
            "membership" => Ok(ChangeChannel::Membership),
            _ => Err(format!("Invalid change channel: {}", s)),
        }
    }
}

/// Operation carried by a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Add,
    Update,
    Remove,
    /// Full re-sync of one group's member set
    Refresh,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOperation::Add => "add",
            ChangeOperation::Update => "update",
            ChangeOperation::Remove => "remove",
            ChangeOperation::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
