//! Mutations understood by a `CacheProjector`

/// A single index write inside a command batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
    /// Add members to a set
    SetAdd { key: String, members: Vec<String> },
    /// Set fields of a hash
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },
}

/// Ordered list of commands applied as one atomic unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<CacheCommand>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `SADD key members...`; an empty member list queues nothing.
    pub fn set_add<I, S>(&mut self, key: String, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        if !members.is_empty() {
            self.commands.push(CacheCommand::SetAdd { key, members });
        }
        self
    }

    /// Queue `HSET key field value...`
    pub fn hash_set(&mut self, key: String, fields: Vec<(String, String)>) -> &mut Self {
        if !fields.is_empty() {
            self.commands.push(CacheCommand::HashSet { key, fields });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CacheCommand> {
        self.commands.iter()
    }
}

/// Multi-key mutations that must be indivisible for readers
///
/// Every script is idempotent: running it again after it succeeded leaves
/// the store unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionScript {
    /// Drop a group from the registry, its member index, every member's
    /// group-list index and the node assignment index
    RemoveGroup { group_id: String },
    /// Drop a user's keys and remove it from every group it belonged to
    RemoveUser { user_id: String },
    /// Replace a group's member index with `members` and reconcile the
    /// group-list index of users that joined or left
    ReplaceGroupMembers {
        group_id: String,
        members: Vec<String>,
    },
}

impl ProjectionScript {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionScript::RemoveGroup { .. } => "remove_group",
            ProjectionScript::RemoveUser { .. } => "remove_user",
            ProjectionScript::ReplaceGroupMembers { .. } => "replace_group_members",
        }
    }
}
