//! Refresh notifications consumed by worker nodes

use serde::{Deserialize, Serialize};

/// Slice of the projection a node must reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshScope {
    GroupRemoved,
    MembershipUpdated,
}

impl RefreshScope {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshScope::GroupRemoved => "group-removed",
            RefreshScope::MembershipUpdated => "membership-updated",
        }
    }
}

impl std::fmt::Display for RefreshScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hint telling nodes to reload one scope; never carries the data itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshNotification {
    pub scope: RefreshScope,
    pub target_id: String,
}

impl RefreshNotification {
    pub fn new(scope: RefreshScope, target_id: &str) -> Self {
        Self {
            scope,
            target_id: target_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let notification = RefreshNotification::new(RefreshScope::GroupRemoved, "G42");
        let json = serde_json::to_string(&notification).unwrap();
        assert_eq!(json, r#"{"scope":"group-removed","targetId":"G42"}"#);

        let parsed: RefreshNotification = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, notification);
    }

    #[test]
    fn test_scope_labels() {
        assert_eq!(RefreshScope::MembershipUpdated.to_string(), "membership-updated");
    }
}
