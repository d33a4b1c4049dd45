//! Envelope routing, end to end through the coordinator

mod common;

use std::sync::Arc;

use common::{Harness, Journal, JournaledProjector, JournaledSource, group_envelope};
use roster_cache::{KeySpace, MemoryCoordinationStore, RefreshNotification, RefreshScope};
use roster_common::{ChangeChannel, ErrorKind};
use roster_persistence::{MemoryStore, SessionPool, SessionPoolConfig};
use roster_sync::{EventRouter, SyncCoordinator};

#[tokio::test]
async fn test_end_to_end_group_add() {
    let h = Harness::new();
    let keys = h.keys();

    h.router
        .handle(ChangeChannel::Group, br#"{"type":"add","data":"G42"}"#)
        .await
        .unwrap();

    let group = h.store.group("G42").unwrap();
    assert_eq!(group.name, "G42");
    assert_eq!(h.cache.members(&keys.groups()), vec!["G42"]);
    assert!(h.cache.members(&keys.group_members("G42")).is_empty());
    assert!(h.cache.notifications().is_empty());
}

#[tokio::test]
async fn test_end_to_end_group_remove() {
    let h = Harness::new();
    let keys = h.keys();
    h.store.add_member("G42", "u1");
    h.router
        .handle(ChangeChannel::Group, &group_envelope("add", "G42"))
        .await
        .unwrap();
    let store_before = h.store.snapshot();

    h.router
        .handle(ChangeChannel::Group, &group_envelope("remove", "G42"))
        .await
        .unwrap();

    assert_eq!(h.store.snapshot(), store_before);
    assert!(h.store.group("G42").is_some());
    assert!(h.cache.members(&keys.groups()).is_empty());
    assert!(!h.cache.contains_key(&keys.group_members("G42")));
    assert!(!h.cache.contains_key(&keys.user_groups("u1")));
    assert_eq!(
        h.cache.notifications(),
        vec![RefreshNotification::new(RefreshScope::GroupRemoved, "G42")]
    );

    let cache_after = h.cache.snapshot();
    h.router
        .handle(ChangeChannel::Group, &group_envelope("remove", "G42"))
        .await
        .unwrap();
    assert_eq!(h.cache.snapshot(), cache_after);
    assert_eq!(h.store.snapshot(), store_before);
}

#[tokio::test]
async fn test_group_update_changes_nothing() {
    let h = Harness::new();
    h.store.add_member("G1", "u1");
    h.router
        .handle(ChangeChannel::Group, &group_envelope("add", "G1"))
        .await
        .unwrap();
    let store_before = h.store.snapshot();
    let cache_before = h.cache.snapshot();
    let pool_before = h.pool().snapshot();

    h.router
        .handle(ChangeChannel::Group, &group_envelope("update", "G1"))
        .await
        .unwrap();

    assert_eq!(h.store.snapshot(), store_before);
    assert_eq!(h.cache.snapshot(), cache_before);
    assert_eq!(h.pool().snapshot(), pool_before);
    assert!(h.cache.notifications().is_empty());
}

#[tokio::test]
async fn test_user_channel_routes_add_and_update_to_upsert() {
    let h = Harness::new();
    let keys = h.keys();
    h.store.add_member("G1", "u1");

    h.router
        .handle(ChangeChannel::User, br#"{"type":"update","data":"u1"}"#)
        .await
        .unwrap();
    h.router
        .handle(ChangeChannel::User, br#"{"type":"add","data":"u2"}"#)
        .await
        .unwrap();

    assert_eq!(h.cache.members(&keys.users()), vec!["u1", "u2"]);
    assert_eq!(h.cache.members(&keys.group_members("G1")), vec!["u1"]);

    h.router
        .handle(ChangeChannel::User, br#"{"type":"remove","data":"u1"}"#)
        .await
        .unwrap();
    assert_eq!(h.cache.members(&keys.users()), vec!["u2"]);
    assert!(h.store.user("u1").is_some());
}

#[tokio::test]
async fn test_membership_channel_refreshes_group() {
    let h = Harness::new();
    let keys = h.keys();
    h.store.add_member("G7", "u1");

    h.router
        .handle(ChangeChannel::Membership, br#"{"type":"update","data":"G7"}"#)
        .await
        .unwrap();

    assert_eq!(h.cache.members(&keys.group_members("G7")), vec!["u1"]);
    // A refresh does not register the group
    assert!(h.cache.members(&keys.groups()).is_empty());
    assert_eq!(
        h.cache.notifications(),
        vec![RefreshNotification::new(RefreshScope::MembershipUpdated, "G7")]
    );
}

#[tokio::test]
async fn test_malformed_envelopes_are_reported() {
    let h = Harness::new();

    for (channel, payload) in [
        (ChangeChannel::Group, br#"{"type":"rename","data":"G1"}"#.as_slice()),
        (ChangeChannel::Group, br#"{"type":"add","data":""}"#.as_slice()),
        (ChangeChannel::User, b"{".as_slice()),
        (ChangeChannel::Membership, br#"{"type":"update"}"#.as_slice()),
    ] {
        let err = h.router.handle(channel, payload).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(!err.is_retryable());
    }

    assert_eq!(h.pool().snapshot().acquired, 0);
    assert!(h.cache.snapshot().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_never_interleave() {
    let journal = Journal::default();
    let store = MemoryStore::new();
    let cache = MemoryCoordinationStore::new(KeySpace::default());
    let projector = Arc::new(JournaledProjector {
        inner: cache.clone(),
        journal: journal.clone(),
    });
    let source = Arc::new(JournaledSource {
        inner: store.clone(),
        journal: journal.clone(),
    });
    let pool = SessionPool::new(source, SessionPoolConfig::default());
    let coordinator = Arc::new(SyncCoordinator::new(pool, projector.clone(), projector));
    let router = EventRouter::new(coordinator);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let events = [
            (ChangeChannel::Group, format!(r#"{{"type":"add","data":"G{i}"}}"#)),
            (ChangeChannel::User, format!(r#"{{"type":"add","data":"u{i}"}}"#)),
            (ChangeChannel::Membership, format!(r#"{{"type":"update","data":"G{i}"}}"#)),
            (ChangeChannel::Group, format!(r#"{{"type":"remove","data":"G{i}"}}"#)),
        ];
        for (channel, payload) in events {
            let router = router.clone();
            tasks.push(tokio::spawn(async move {
                router.handle(channel, payload.as_bytes()).await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let entries = journal.entries();
    assert_eq!(entries.len(), 64);
    for pair in entries.chunks(2) {
        assert_eq!(pair, ["store", "cache"]);
    }
}
