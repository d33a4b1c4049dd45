//! Persistence traits for the persistent store gateway
//!
//! A `SessionSource` opens sessions against one storage backend. The
//! `SessionPool` bounds how many are open at once and guarantees every
//! session is released exactly once.

use async_trait::async_trait;

use crate::model::{GroupMembership, GroupRecord, StorageMode, UserCriteria, UserRecord};

/// One unit of work against the source of truth
///
/// Writes become visible to other sessions only after `commit`.
#[async_trait]
pub trait StoreSession: Send {
    /// Insert the group if missing and return the stored record.
    /// Existing attributes are never overwritten.
    async fn upsert_group(&mut self, group_id: &str) -> anyhow::Result<GroupRecord>;

    /// Insert the user if missing and return the stored record with its groups.
    /// Existing attributes are never overwritten.
    async fn upsert_user(&mut self, criteria: &UserCriteria) -> anyhow::Result<UserRecord>;

    /// Read the full member set of a group
    async fn load_group_members(&mut self, group_id: &str) -> anyhow::Result<GroupMembership>;

    /// Read the ids of the groups a user belongs to
    async fn load_user_groups(&mut self, user_id: &str) -> anyhow::Result<Vec<String>>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;

    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

/// Opens sessions against a storage backend
#[async_trait]
pub trait SessionSource: Send + Sync {
    fn storage_mode(&self) -> StorageMode;

    async fn open(&self) -> anyhow::Result<Box<dyn StoreSession>>;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}
