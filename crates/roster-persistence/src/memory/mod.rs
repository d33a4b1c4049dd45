//! In-memory persistence backend
//!
//! Keeps the group, user and membership tables in process. Sessions stage
//! their writes and apply them on commit, so a rolled-back session leaves the
//! tables untouched. Faults can be injected per operation to exercise the
//! failure paths of the sync engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::model::{GroupMembership, GroupRecord, StorageMode, UserCriteria, UserRecord};
use crate::traits::{SessionSource, StoreSession};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Open,
    UpsertGroup,
    UpsertUser,
    LoadGroupMembers,
    LoadUserGroups,
    Commit,
}

/// Copy of every table, comparable across calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub groups: BTreeMap<String, String>,
    pub users: BTreeMap<String, String>,
    pub members: BTreeSet<(String, String)>,
}

/// Shared in-memory tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<StoreSnapshot>>,
    faults: Arc<Mutex<HashMap<StoreOp, u32>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_times(op, 1);
    }

    /// Make the next `times` calls of `op` fail
    pub fn fail_times(&self, op: StoreOp, times: u32) {
        *self.faults.lock().entry(op).or_insert(0) += times;
    }

    fn check(&self, op: StoreOp) -> anyhow::Result<()> {
        let mut faults = self.faults.lock();
        match faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                anyhow::bail!("injected {:?} failure", op)
            }
            _ => Ok(()),
        }
    }

    pub fn insert_group(&self, id: &str, name: &str) {
        self.tables
            .write()
            .groups
            .insert(id.to_string(), name.to_string());
    }

    pub fn insert_user(&self, id: &str, name: &str) {
        self.tables
            .write()
            .users
            .insert(id.to_string(), name.to_string());
    }

    pub fn add_member(&self, group_id: &str, user_id: &str) {
        self.tables
            .write()
            .members
            .insert((group_id.to_string(), user_id.to_string()));
    }

    pub fn remove_member(&self, group_id: &str, user_id: &str) {
        self.tables
            .write()
            .members
            .remove(&(group_id.to_string(), user_id.to_string()));
    }

    pub fn group(&self, id: &str) -> Option<GroupRecord> {
        self.tables.read().groups.get(id).map(|name| GroupRecord {
            id: id.to_string(),
            name: name.clone(),
        })
    }

    pub fn user(&self, id: &str) -> Option<UserRecord> {
        let tables = self.tables.read();
        tables.users.get(id).map(|name| UserRecord {
            id: id.to_string(),
            name: name.clone(),
            groups: groups_of(&tables.members, id),
        })
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.tables.read().clone()
    }
}

fn members_of(members: &BTreeSet<(String, String)>, group_id: &str) -> Vec<String> {
    members
        .iter()
        .filter(|(group, _)| group == group_id)
        .map(|(_, user)| user.clone())
        .collect()
}

fn groups_of(members: &BTreeSet<(String, String)>, user_id: &str) -> Vec<String> {
    members
        .iter()
        .filter(|(_, user)| user == user_id)
        .map(|(group, _)| group.clone())
        .collect()
}

#[async_trait]
impl SessionSource for MemoryStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    async fn open(&self) -> anyhow::Result<Box<dyn StoreSession>> {
        self.check(StoreOp::Open)?;
        Ok(Box::new(MemorySession {
            store: self.clone(),
            staged_groups: BTreeMap::new(),
            staged_users: BTreeMap::new(),
        }))
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct MemorySession {
    store: MemoryStore,
    staged_groups: BTreeMap<String, String>,
    staged_users: BTreeMap<String, String>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn upsert_group(&mut self, group_id: &str) -> anyhow::Result<GroupRecord> {
        self.store.check(StoreOp::UpsertGroup)?;
        let existing = self.store.tables.read().groups.get(group_id).cloned();
        let name = match existing {
            Some(name) => name,
            None => self
                .staged_groups
                .entry(group_id.to_string())
                .or_insert_with(|| group_id.to_string())
                .clone(),
        };
        Ok(GroupRecord {
            id: group_id.to_string(),
            name,
        })
    }

    async fn upsert_user(&mut self, criteria: &UserCriteria) -> anyhow::Result<UserRecord> {
        self.store.check(StoreOp::UpsertUser)?;
        let tables = self.store.tables.read();
        let name = match tables.users.get(&criteria.id) {
            Some(name) => name.clone(),
            None => self
                .staged_users
                .entry(criteria.id.clone())
                .or_insert_with(|| criteria.display_name().to_string())
                .clone(),
        };
        Ok(UserRecord {
            id: criteria.id.clone(),
            name,
            groups: groups_of(&tables.members, &criteria.id),
        })
    }

    async fn load_group_members(&mut self, group_id: &str) -> anyhow::Result<GroupMembership> {
        self.store.check(StoreOp::LoadGroupMembers)?;
        let tables = self.store.tables.read();
        Ok(GroupMembership::new(
            group_id,
            members_of(&tables.members, group_id),
        ))
    }

    async fn load_user_groups(&mut self, user_id: &str) -> anyhow::Result<Vec<String>> {
        self.store.check(StoreOp::LoadUserGroups)?;
        Ok(groups_of(&self.store.tables.read().members, user_id))
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let MemorySession {
            store,
            staged_groups,
            staged_users,
        } = *self;
        store.check(StoreOp::Commit)?;
        let mut tables = store.tables.write();
        for (id, name) in staged_groups {
            tables.groups.entry(id).or_insert(name);
        }
        for (id, name) in staged_users {
            tables.users.entry(id).or_insert(name);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}
