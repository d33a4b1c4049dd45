//! In-memory coordination store
//!
//! Mirrors the Redis semantics the projection relies on: sets vanish when
//! their last member is removed, scripts and batches apply under one lock so
//! readers never observe a partial mutation. Used by tests and by embedders
//! running without Redis; faults can be injected per operation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::{CacheCommand, CommandBatch, ProjectionScript};
use crate::keys::KeySpace;
use crate::notification::RefreshNotification;
use crate::traits::{CacheProjector, NodeNotifier};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Execute,
    RunScript,
    Notify,
}

/// Value stored under one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
    Str(String),
}

#[derive(Default)]
struct State {
    data: BTreeMap<String, CacheValue>,
    notifications: Vec<RefreshNotification>,
    faults: HashMap<CacheOp, u32>,
}

impl State {
    fn check(&mut self, op: CacheOp) -> anyhow::Result<()> {
        match self.faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                anyhow::bail!("injected {:?} failure", op)
            }
            _ => Ok(()),
        }
    }

    fn set_mut(&mut self, key: &str) -> anyhow::Result<&mut BTreeSet<String>> {
        let value = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| CacheValue::Set(BTreeSet::new()));
        match value {
            CacheValue::Set(set) => Ok(set),
            _ => anyhow::bail!("WRONGTYPE {key} does not hold a set"),
        }
    }

    fn members(&self, key: &str) -> Vec<String> {
        match self.data.get(key) {
            Some(CacheValue::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn sadd(&mut self, key: &str, members: &[String]) -> anyhow::Result<()> {
        let set = self.set_mut(key)?;
        set.extend(members.iter().cloned());
        Ok(())
    }

    fn srem(&mut self, key: &str, member: &str) {
        if let Some(CacheValue::Set(set)) = self.data.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                self.data.remove(key);
            }
        }
    }

    fn hset(&mut self, key: &str, fields: &[(String, String)]) -> anyhow::Result<()> {
        let value = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| CacheValue::Hash(BTreeMap::new()));
        match value {
            CacheValue::Hash(hash) => {
                hash.extend(fields.iter().cloned());
                Ok(())
            }
            _ => anyhow::bail!("WRONGTYPE {key} does not hold a hash"),
        }
    }

    fn get_str(&self, key: &str) -> Option<String> {
        match self.data.get(key) {
            Some(CacheValue::Str(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn del(&mut self, key: &str) {
        self.data.remove(key);
    }
}

#[derive(Clone, Default)]
pub struct MemoryCoordinationStore {
    keys: KeySpace,
    state: Arc<Mutex<State>>,
}

impl MemoryCoordinationStore {
    pub fn new(keys: KeySpace) -> Self {
        Self {
            keys,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Make the next call of `op` fail
    pub fn fail_next(&self, op: CacheOp) {
        *self.state.lock().faults.entry(op).or_insert(0) += 1;
    }

    /// Members of the set at `key`, sorted; empty when the key is absent
    pub fn members(&self, key: &str) -> Vec<String> {
        self.state.lock().members(key)
    }

    pub fn hash(&self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.state.lock().data.get(key) {
            Some(CacheValue::Hash(hash)) => Some(hash.clone()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().data.contains_key(key)
    }

    /// Write a plain string value, as the node dispatcher does for assignments
    pub fn set_string(&self, key: &str, value: &str) {
        self.state
            .lock()
            .data
            .insert(key.to_string(), CacheValue::Str(value.to_string()));
    }

    pub fn add_members(&self, key: &str, members: &[&str]) {
        let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
        let mut state = self.state.lock();
        if let Err(e) = state.sadd(key, &members) {
            tracing::warn!(key, error = %e, "Ignoring write to mistyped key");
        }
    }

    /// Copy of every key, comparable across calls
    pub fn snapshot(&self) -> BTreeMap<String, CacheValue> {
        self.state.lock().data.clone()
    }

    /// Every refresh notification published so far, oldest first
    pub fn notifications(&self) -> Vec<RefreshNotification> {
        self.state.lock().notifications.clone()
    }

    fn apply_script(&self, state: &mut State, script: &ProjectionScript) -> anyhow::Result<()> {
        let keys = &self.keys;
        match script {
            ProjectionScript::RemoveGroup { group_id } => {
                for user in state.members(&keys.group_members(group_id)) {
                    state.srem(&keys.user_groups(&user), group_id);
                }
                if let Some(node) = state.get_str(&keys.group_node(group_id)) {
                    state.srem(&keys.node_groups(&node), group_id);
                }
                state.del(&keys.group(group_id));
                state.del(&keys.group_members(group_id));
                state.del(&keys.group_node(group_id));
                state.srem(&keys.groups(), group_id);
            }
            ProjectionScript::RemoveUser { user_id } => {
                for group in state.members(&keys.user_groups(user_id)) {
                    state.srem(&keys.group_members(&group), user_id);
                }
                state.del(&keys.user(user_id));
                state.del(&keys.user_groups(user_id));
                state.srem(&keys.users(), user_id);
            }
            ProjectionScript::ReplaceGroupMembers { group_id, members } => {
                let index = keys.group_members(group_id);
                let wanted: BTreeSet<&String> = members.iter().collect();
                for user in state.members(&index) {
                    if !wanted.contains(&user) {
                        state.srem(&keys.user_groups(&user), group_id);
                    }
                }
                state.del(&index);
                for user in members {
                    state.sadd(&index, std::slice::from_ref(user))?;
                    state.sadd(&keys.user_groups(user), std::slice::from_ref(group_id))?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheProjector for MemoryCoordinationStore {
    fn keys(&self) -> &KeySpace {
        &self.keys
    }

    async fn execute(&self, batch: &CommandBatch) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.check(CacheOp::Execute)?;

        // MULTI/EXEC: validate on a copy so a failing command leaves no trace
        let mut staged = State {
            data: state.data.clone(),
            ..State::default()
        };
        for command in batch.iter() {
            match command {
                CacheCommand::SetAdd { key, members } => staged.sadd(key, members)?,
                CacheCommand::HashSet { key, fields } => staged.hset(key, fields)?,
            }
        }
        state.data = staged.data;
        Ok(())
    }

    async fn run_script(&self, script: &ProjectionScript) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.check(CacheOp::RunScript)?;

        let mut staged = State {
            data: state.data.clone(),
            ..State::default()
        };
        self.apply_script(&mut staged, script)?;
        state.data = staged.data;
        Ok(())
    }
}

#[async_trait]
impl NodeNotifier for MemoryCoordinationStore {
    async fn notify(&self, notification: &RefreshNotification) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.check(CacheOp::Notify)?;
        state.notifications.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::RefreshScope;

    fn store() -> MemoryCoordinationStore {
        MemoryCoordinationStore::new(KeySpace::default())
    }

    #[tokio::test]
    async fn test_execute_batch() {
        let store = store();
        let keys = store.keys().clone();
        let mut batch = CommandBatch::new();
        batch
            .hash_set(
                keys.group("G1"),
                vec![("name".to_string(), "G1".to_string())],
            )
            .set_add(keys.groups(), ["G1"])
            .set_add(keys.group_members("G1"), ["u1", "u2"]);

        store.execute(&batch).await.unwrap();

        assert_eq!(store.members(&keys.groups()), vec!["G1"]);
        assert_eq!(store.members(&keys.group_members("G1")), vec!["u1", "u2"]);
        assert_eq!(store.hash(&keys.group("G1")).unwrap()["name"], "G1");
    }

    #[tokio::test]
    async fn test_failing_batch_leaves_no_trace() {
        let store = store();
        let keys = store.keys().clone();
        store.set_string("roster:clash", "x");
        let before = store.snapshot();

        let mut batch = CommandBatch::new();
        batch
            .set_add(keys.groups(), ["G1"])
            .set_add("roster:clash".to_string(), ["y"]);

        assert!(store.execute(&batch).await.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_remove_group_cleans_every_index() {
        let store = store();
        let keys = store.keys().clone();
        store.add_members(&keys.groups(), &["G1", "G2"]);
        store.add_members(&keys.group_members("G1"), &["u1", "u2"]);
        store.add_members(&keys.user_groups("u1"), &["G1", "G2"]);
        store.add_members(&keys.user_groups("u2"), &["G1"]);
        store.set_string(&keys.group_node("G1"), "node-1");
        store.add_members(&keys.node_groups("node-1"), &["G1", "G7"]);

        let script = ProjectionScript::RemoveGroup {
            group_id: "G1".to_string(),
        };
        store.run_script(&script).await.unwrap();

        assert_eq!(store.members(&keys.groups()), vec!["G2"]);
        assert!(!store.contains_key(&keys.group_members("G1")));
        assert!(!store.contains_key(&keys.group_node("G1")));
        assert_eq!(store.members(&keys.user_groups("u1")), vec!["G2"]);
        assert!(!store.contains_key(&keys.user_groups("u2")));
        assert_eq!(store.members(&keys.node_groups("node-1")), vec!["G7"]);

        let after_first = store.snapshot();
        store.run_script(&script).await.unwrap();
        assert_eq!(store.snapshot(), after_first);
    }

    #[tokio::test]
    async fn test_replace_group_members_reconciles_users() {
        let store = store();
        let keys = store.keys().clone();
        store.add_members(&keys.group_members("G1"), &["u1", "u2"]);
        store.add_members(&keys.user_groups("u1"), &["G1"]);
        store.add_members(&keys.user_groups("u2"), &["G1", "G3"]);

        store
            .run_script(&ProjectionScript::ReplaceGroupMembers {
                group_id: "G1".to_string(),
                members: vec!["u1".to_string(), "u3".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(store.members(&keys.group_members("G1")), vec!["u1", "u3"]);
        assert_eq!(store.members(&keys.user_groups("u2")), vec!["G3"]);
        assert_eq!(store.members(&keys.user_groups("u3")), vec!["G1"]);
    }

    #[tokio::test]
    async fn test_remove_user() {
        let store = store();
        let keys = store.keys().clone();
        store.add_members(&keys.users(), &["u1"]);
        store.add_members(&keys.user_groups("u1"), &["G1", "G2"]);
        store.add_members(&keys.group_members("G1"), &["u1", "u2"]);
        store.add_members(&keys.group_members("G2"), &["u1"]);

        store
            .run_script(&ProjectionScript::RemoveUser {
                user_id: "u1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(store.members(&keys.group_members("G1")), vec!["u2"]);
        assert!(!store.contains_key(&keys.group_members("G2")));
        assert!(store.members(&keys.users()).is_empty());
    }

    #[tokio::test]
    async fn test_notify_and_fault_injection() {
        let store = store();
        store.fail_next(CacheOp::Notify);
        let notification = RefreshNotification::new(RefreshScope::GroupRemoved, "G1");

        assert!(store.notify(&notification).await.is_err());
        store.notify(&notification).await.unwrap();
        assert_eq!(store.notifications(), vec![notification]);
    }
}
