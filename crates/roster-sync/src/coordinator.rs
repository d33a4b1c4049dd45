//! Sync coordinator
//!
//! Applies one change at a time across the persistent store, the cache
//! projection and the node notification channel. Every operation runs the
//! same sequence while holding the process-wide lock:
//!
//! 1. acquire a pooled store session
//! 2. run the store step, then commit (or roll back on failure)
//! 3. apply the cache projection atomically
//! 4. notify nodes, for the operations that have a refresh scope
//!
//! The first failing step ends the operation. Nothing already applied is
//! compensated; redelivery of the event converges the projection because
//! every step is idempotent.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use roster_cache::{
    CacheProjector, CommandBatch, NodeNotifier, ProjectionScript, RefreshNotification,
    RefreshScope,
};
use roster_common::{Result, SyncError};
use roster_persistence::{
    GroupMembership, GroupRecord, PooledSession, SessionOutcome, SessionPool, UserCriteria,
    UserRecord,
};

use crate::metrics::{Timer, record_notification, record_operation};
use crate::projection;

pub struct SyncCoordinator {
    pool: SessionPool,
    projector: Arc<dyn CacheProjector>,
    notifier: Arc<dyn NodeNotifier>,
    lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        pool: SessionPool,
        projector: Arc<dyn CacheProjector>,
        notifier: Arc<dyn NodeNotifier>,
    ) -> Self {
        Self {
            pool,
            projector,
            notifier,
            lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Persist a group and project it with its current members.
    #[tracing::instrument(skip(self))]
    pub async fn apply_group_add(&self, group_id: &str) -> Result<()> {
        let timer = Timer::new();
        let result = async {
            let _guard = self.lock.lock().await;
            let mut session = self.pool.acquire_session().await?;
            let loaded = load_added_group(&mut session, group_id).await;
            let (group, membership) = finish(session, loaded).await?;
            let batch = projection::group_added(self.projector.keys(), &group, &membership);
            self.execute(&batch, "project added group").await?;
            info!(members = membership.members.len(), "Group added");
            Ok::<(), SyncError>(())
        }
        .await;
        record_operation("group_add", result.is_ok(), timer.elapsed_secs());
        result
    }

    /// Drop a group from the projection and tell nodes to reload it.
    ///
    /// The persisted record is left in place; its deletion belongs to the
    /// upstream writer.
    #[tracing::instrument(skip(self))]
    pub async fn apply_group_remove(&self, group_id: &str) -> Result<()> {
        let timer = Timer::new();
        let result = async {
            let _guard = self.lock.lock().await;
            self.touch_session().await?;
            self.run_script(&projection::group_removed(group_id), "project removed group")
                .await?;
            self.notify(RefreshScope::GroupRemoved, group_id).await?;
            info!("Group removed");
            Ok::<(), SyncError>(())
        }
        .await;
        record_operation("group_remove", result.is_ok(), timer.elapsed_secs());
        result
    }

    /// Persist a user (placeholder name = id when new) and project it with
    /// the groups it belongs to.
    #[tracing::instrument(skip(self))]
    pub async fn apply_user_upsert(&self, user_id: &str) -> Result<()> {
        let timer = Timer::new();
        let result = async {
            let _guard = self.lock.lock().await;
            let mut session = self.pool.acquire_session().await?;
            let loaded = load_upserted_user(&mut session, user_id).await;
            let user = finish(session, loaded).await?;
            let batch = projection::user_upserted(self.projector.keys(), &user);
            self.execute(&batch, "project upserted user").await?;
            info!(groups = user.groups.len(), "User upserted");
            Ok::<(), SyncError>(())
        }
        .await;
        record_operation("user_upsert", result.is_ok(), timer.elapsed_secs());
        result
    }

    #[tracing::instrument(skip(self))]
    pub async fn apply_user_remove(&self, user_id: &str) -> Result<()> {
        let timer = Timer::new();
        let result = async {
            let _guard = self.lock.lock().await;
            self.touch_session().await?;
            self.run_script(&projection::user_removed(user_id), "project removed user")
                .await?;
            info!("User removed");
            Ok::<(), SyncError>(())
        }
        .await;
        record_operation("user_remove", result.is_ok(), timer.elapsed_secs());
        result
    }

    /// Re-read a group's full member set and replace its projection.
    #[tracing::instrument(skip(self))]
    pub async fn apply_membership_refresh(&self, group_id: &str) -> Result<()> {
        let timer = Timer::new();
        let result = async {
            let _guard = self.lock.lock().await;
            let mut session = self.pool.acquire_session().await?;
            let loaded = load_membership(&mut session, group_id).await;
            let membership = finish(session, loaded).await?;
            self.run_script(
                &projection::membership_refreshed(&membership),
                "project refreshed membership",
            )
            .await?;
            self.notify(RefreshScope::MembershipUpdated, group_id).await?;
            info!(members = membership.members.len(), "Membership refreshed");
            Ok::<(), SyncError>(())
        }
        .await;
        record_operation("membership_refresh", result.is_ok(), timer.elapsed_secs());
        result
    }

    /// Acquire and release a session without touching the store.
    async fn touch_session(&self) -> Result<()> {
        let session = self.pool.acquire_session().await?;
        session.release(SessionOutcome::Commit).await
    }

    async fn execute(&self, batch: &CommandBatch, context: &str) -> Result<()> {
        self.projector
            .execute(batch)
            .await
            .map_err(|e| SyncError::projection(context, e))
    }

    async fn run_script(&self, script: &ProjectionScript, context: &str) -> Result<()> {
        self.projector
            .run_script(script)
            .await
            .map_err(|e| SyncError::projection(context, e))
    }

    async fn notify(&self, scope: RefreshScope, target_id: &str) -> Result<()> {
        let notification = RefreshNotification::new(scope, target_id);
        self.notifier
            .notify(&notification)
            .await
            .map_err(|e| SyncError::notification(&format!("notify {scope} {target_id}"), e))?;
        record_notification(scope.as_str());
        debug!(%scope, target_id, "Refresh notification published");
        Ok(())
    }
}

/// Commit the session when the store step succeeded, roll it back otherwise.
///
/// The slot is back in the pool before this returns. A step error takes
/// precedence over a release error.
async fn finish<T>(session: PooledSession, result: Result<T>) -> Result<T> {
    let released = session.release(SessionOutcome::of(&result)).await;
    let value = result?;
    released?;
    Ok(value)
}

async fn load_added_group(
    session: &mut PooledSession,
    group_id: &str,
) -> Result<(GroupRecord, GroupMembership)> {
    let group = session
        .upsert_group(group_id)
        .await
        .map_err(|e| SyncError::store(&format!("upsert group {group_id}"), e))?;
    let membership = session
        .load_group_members(group_id)
        .await
        .map_err(|e| SyncError::store(&format!("load members of {group_id}"), e))?;
    Ok((group, membership))
}

async fn load_upserted_user(session: &mut PooledSession, user_id: &str) -> Result<UserRecord> {
    let mut user = session
        .upsert_user(&UserCriteria::by_id(user_id))
        .await
        .map_err(|e| SyncError::store(&format!("upsert user {user_id}"), e))?;
    user.groups = session
        .load_user_groups(user_id)
        .await
        .map_err(|e| SyncError::store(&format!("load groups of {user_id}"), e))?;
    Ok(user)
}

async fn load_membership(session: &mut PooledSession, group_id: &str) -> Result<GroupMembership> {
    session
        .load_group_members(group_id)
        .await
        .map_err(|e| SyncError::store(&format!("load members of {group_id}"), e))
}
