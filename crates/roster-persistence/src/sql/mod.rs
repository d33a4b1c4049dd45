//! SQL-based persistence backend (MySQL/PostgreSQL/SQLite via SeaORM)
//!
//! Every store session is one database transaction. Upserts look the row up
//! inside the transaction and insert it only when missing, so replaying the
//! same event leaves the tables unchanged.

use anyhow::Context;
use async_trait::async_trait;
use sea_orm::*;
use tracing::info;

use crate::entity::{group_info, group_member, user_info};
use crate::model::{GroupMembership, GroupRecord, StorageMode, UserCriteria, UserRecord};
use crate::traits::{SessionSource, StoreSession};

/// External database session source
///
/// Wraps a SeaORM `DatabaseConnection`; the connection's own pool provides
/// the physical connections behind each transaction.
#[derive(Clone)]
pub struct SqlSessionSource {
    db: DatabaseConnection,
}

impl SqlSessionSource {
    /// Create a new SqlSessionSource with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the roster tables if they do not exist yet
    pub async fn create_schema(&self) -> anyhow::Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let statements = [
            schema.create_table_from_entity(group_info::Entity),
            schema.create_table_from_entity(user_info::Entity),
            schema.create_table_from_entity(group_member::Entity),
        ];
        for mut statement in statements {
            statement.if_not_exists();
            self.db
                .execute(backend.build(&statement))
                .await
                .context("create roster table")?;
        }

        info!(backend = ?backend, "Roster schema ready");
        Ok(())
    }
}

#[async_trait]
impl SessionSource for SqlSessionSource {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Sql
    }

    async fn open(&self) -> anyhow::Result<Box<dyn StoreSession>> {
        let txn = self.db.begin().await.context("begin transaction")?;
        Ok(Box::new(SqlSession { txn }))
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}

struct SqlSession {
    txn: DatabaseTransaction,
}

impl SqlSession {
    async fn user_groups(&self, user_id: &str) -> anyhow::Result<Vec<String>> {
        let rows = group_member::Entity::find()
            .filter(group_member::Column::UserId.eq(user_id))
            .order_by_asc(group_member::Column::GroupId)
            .all(&self.txn)
            .await
            .context("query user groups")?;
        Ok(rows.into_iter().map(|row| row.group_id).collect())
    }
}

#[async_trait]
impl StoreSession for SqlSession {
    async fn upsert_group(&mut self, group_id: &str) -> anyhow::Result<GroupRecord> {
        if let Some(existing) = group_info::Entity::find_by_id(group_id.to_string())
            .one(&self.txn)
            .await
            .context("query group")?
        {
            return Ok(existing.into());
        }

        let now = chrono::Utc::now().naive_utc();
        let model = group_info::ActiveModel {
            id: Set(group_id.to_string()),
            name: Set(group_id.to_string()),
            gmt_create: Set(now),
            gmt_modified: Set(now),
        }
        .insert(&self.txn)
        .await
        .context("insert group")?;

        Ok(model.into())
    }

    async fn upsert_user(&mut self, criteria: &UserCriteria) -> anyhow::Result<UserRecord> {
        let model = match user_info::Entity::find_by_id(criteria.id.clone())
            .one(&self.txn)
            .await
            .context("query user")?
        {
            Some(existing) => existing,
            None => {
                let now = chrono::Utc::now().naive_utc();
                user_info::ActiveModel {
                    id: Set(criteria.id.clone()),
                    name: Set(criteria.display_name().to_string()),
                    gmt_create: Set(now),
                    gmt_modified: Set(now),
                }
                .insert(&self.txn)
                .await
                .context("insert user")?
            }
        };

        let groups = self.user_groups(&criteria.id).await?;
        Ok(UserRecord::from_model(model, groups))
    }

    async fn load_group_members(&mut self, group_id: &str) -> anyhow::Result<GroupMembership> {
        let rows = group_member::Entity::find()
            .filter(group_member::Column::GroupId.eq(group_id))
            .order_by_asc(group_member::Column::UserId)
            .all(&self.txn)
            .await
            .context("query group members")?;

        Ok(GroupMembership::new(
            group_id,
            rows.into_iter().map(|row| row.user_id).collect(),
        ))
    }

    async fn load_user_groups(&mut self, user_id: &str) -> anyhow::Result<Vec<String>> {
        self.user_groups(user_id).await
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.txn.commit().await.context("commit transaction")
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.txn.rollback().await.context("roll back transaction")
    }
}
