//! Projection scripts against the in-memory coordination store

use roster_cache::{
    CacheOp, CacheProjector, CommandBatch, KeySpace, MemoryCoordinationStore, ProjectionScript,
};

fn seeded(prefix: &str) -> MemoryCoordinationStore {
    let store = MemoryCoordinationStore::new(KeySpace::new(prefix));
    let keys = store.keys().clone();
    store.add_members(&keys.groups(), &["G1", "G2"]);
    store.add_members(&keys.group_members("G1"), &["u1", "u2"]);
    store.add_members(&keys.group_members("G2"), &["u1"]);
    store.add_members(&keys.user_groups("u1"), &["G1", "G2"]);
    store.add_members(&keys.user_groups("u2"), &["G1"]);
    store
}

#[tokio::test]
async fn test_every_script_is_idempotent() {
    let scripts = [
        ProjectionScript::RemoveGroup {
            group_id: "G1".to_string(),
        },
        ProjectionScript::RemoveUser {
            user_id: "u1".to_string(),
        },
        ProjectionScript::ReplaceGroupMembers {
            group_id: "G2".to_string(),
            members: vec!["u2".to_string(), "u3".to_string()],
        },
    ];

    for script in scripts {
        let store = seeded("roster");
        store.run_script(&script).await.unwrap();
        let once = store.snapshot();
        store.run_script(&script).await.unwrap();
        assert_eq!(store.snapshot(), once, "{} is not idempotent", script.name());
    }
}

#[tokio::test]
async fn test_failed_script_changes_nothing() {
    let store = seeded("roster");
    let before = store.snapshot();
    store.fail_next(CacheOp::RunScript);

    let result = store
        .run_script(&ProjectionScript::RemoveGroup {
            group_id: "G1".to_string(),
        })
        .await;

    assert!(result.is_err());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_prefix_isolates_projections() {
    let store = seeded("tenant-a");
    let mut batch = CommandBatch::new();
    batch.set_add(KeySpace::new("tenant-b").groups(), ["G9"]);
    store.execute(&batch).await.unwrap();

    assert_eq!(store.members("tenant-a:groups"), vec!["G1", "G2"]);
    assert_eq!(store.members("tenant-b:groups"), vec!["G9"]);
}
