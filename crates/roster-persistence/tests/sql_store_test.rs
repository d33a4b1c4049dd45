//! Integration tests for the SeaORM backend
//!
//! Runs against a SQLite database file in a temporary directory.

use std::sync::Arc;

use roster_persistence::entity::{group_member, user_info};
use roster_persistence::sea_orm::{
    ActiveModelTrait, Database, DatabaseConnection, EntityTrait, Set,
};
use roster_persistence::{
    SessionOutcome, SessionPool, SessionPoolConfig, SessionSource, SqlSessionSource, UserCriteria,
};

async fn setup() -> (tempfile::TempDir, SqlSessionSource) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("roster.db").display());
    let db: DatabaseConnection = Database::connect(url).await.unwrap();
    let source = SqlSessionSource::new(db);
    source.create_schema().await.unwrap();
    (dir, source)
}

async fn seed_member(db: &DatabaseConnection, group_id: &str, user_id: &str) {
    let now = chrono::Utc::now().naive_utc();
    group_member::ActiveModel {
        group_id: Set(group_id.to_string()),
        user_id: Set(user_id.to_string()),
        gmt_create: Set(now),
    }
    .insert(db)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_schema_creation_is_repeatable() {
    let (_dir, source) = setup().await;
    source.create_schema().await.unwrap();
    source.health_check().await.unwrap();
}

#[tokio::test]
async fn test_upsert_group_commits_once() {
    let (_dir, source) = setup().await;

    for _ in 0..2 {
        let mut session = source.open().await.unwrap();
        let group = session.upsert_group("G42").await.unwrap();
        assert_eq!(group.id, "G42");
        assert_eq!(group.name, "G42");
        session.commit().await.unwrap();
    }

    let mut session = source.open().await.unwrap();
    let membership = session.load_group_members("G42").await.unwrap();
    assert!(membership.is_empty());
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rollback_discards_insert() {
    let (_dir, source) = setup().await;

    let mut session = source.open().await.unwrap();
    session.upsert_user(&UserCriteria::by_id("u1")).await.unwrap();
    session.rollback().await.unwrap();

    let found = user_info::Entity::find_by_id("u1".to_string())
        .one(source.db())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_upsert_user_keeps_name_and_reads_groups() {
    let (_dir, source) = setup().await;
    let now = chrono::Utc::now().naive_utc();
    user_info::ActiveModel {
        id: Set("u1".to_string()),
        name: Set("Ada".to_string()),
        gmt_create: Set(now),
        gmt_modified: Set(now),
    }
    .insert(source.db())
    .await
    .unwrap();
    seed_member(source.db(), "G2", "u1").await;
    seed_member(source.db(), "G1", "u1").await;

    let mut session = source.open().await.unwrap();
    let user = session.upsert_user(&UserCriteria::by_id("u1")).await.unwrap();
    session.commit().await.unwrap();

    assert_eq!(user.name, "Ada");
    assert_eq!(user.groups, vec!["G1", "G2"]);
}

#[tokio::test]
async fn test_pool_over_sql_source() {
    let (_dir, source) = setup().await;
    seed_member(source.db(), "G1", "u2").await;
    seed_member(source.db(), "G1", "u1").await;

    let pool = SessionPool::new(Arc::new(source), SessionPoolConfig::default());
    let baseline = pool.available();

    let mut session = pool.acquire_session().await.unwrap();
    let membership = session.load_group_members("G1").await.unwrap();
    session.release(SessionOutcome::Commit).await.unwrap();

    assert_eq!(membership.members, vec!["u1", "u2"]);
    assert_eq!(pool.available(), baseline);
}
