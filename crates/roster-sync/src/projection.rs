//! Translation of persisted records into coordination-store mutations

use roster_cache::{CommandBatch, KeySpace, ProjectionScript};
use roster_persistence::{GroupMembership, GroupRecord, UserRecord};

const NAME_FIELD: &str = "name";

/// Register a group with its current members.
///
/// A group without members still gets its registry entry and attribute hash;
/// its member index is simply absent, which readers treat as empty.
pub fn group_added(keys: &KeySpace, group: &GroupRecord, membership: &GroupMembership) -> CommandBatch {
    let mut batch = CommandBatch::new();
    batch
        .hash_set(
            keys.group(&group.id),
            vec![(NAME_FIELD.to_string(), group.name.clone())],
        )
        .set_add(keys.groups(), [group.id.as_str()])
        .set_add(
            keys.group_members(&group.id),
            membership.members.iter().map(String::as_str),
        );
    for user_id in &membership.members {
        batch.set_add(keys.user_groups(user_id), [group.id.as_str()]);
    }
    batch
}

/// Project a user and the groups it belongs to.
///
/// Only adds entries; a user leaving a group is reconciled by the next
/// membership refresh of that group.
pub fn user_upserted(keys: &KeySpace, user: &UserRecord) -> CommandBatch {
    let mut batch = CommandBatch::new();
    batch
        .hash_set(
            keys.user(&user.id),
            vec![(NAME_FIELD.to_string(), user.name.clone())],
        )
        .set_add(keys.users(), [user.id.as_str()])
        .set_add(keys.user_groups(&user.id), user.groups.iter().map(String::as_str));
    for group_id in &user.groups {
        batch.set_add(keys.group_members(group_id), [user.id.as_str()]);
    }
    batch
}

pub fn group_removed(group_id: &str) -> ProjectionScript {
    ProjectionScript::RemoveGroup {
        group_id: group_id.to_string(),
    }
}

pub fn user_removed(user_id: &str) -> ProjectionScript {
    ProjectionScript::RemoveUser {
        user_id: user_id.to_string(),
    }
}

pub fn membership_refreshed(membership: &GroupMembership) -> ProjectionScript {
    ProjectionScript::ReplaceGroupMembers {
        group_id: membership.group_id.clone(),
        members: membership.members.clone(),
    }
}
