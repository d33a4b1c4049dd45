//! Shared fixtures for the sync engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use roster_cache::{
    CacheProjector, CommandBatch, KeySpace, MemoryCoordinationStore, NodeNotifier,
    ProjectionScript, RefreshNotification,
};
use roster_persistence::{
    MemoryStore, SessionPool, SessionPoolConfig, SessionSource, StorageMode, StoreSession,
};
use roster_sync::{EventRouter, SyncCoordinator};

pub struct Harness {
    pub store: MemoryStore,
    pub cache: MemoryCoordinationStore,
    pub coordinator: Arc<SyncCoordinator>,
    pub router: EventRouter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_pool(SessionPoolConfig::default())
    }

    pub fn with_pool(config: SessionPoolConfig) -> Self {
        let store = MemoryStore::new();
        let cache = MemoryCoordinationStore::new(KeySpace::default());
        let pool = SessionPool::new(Arc::new(store.clone()), config);
        let coordinator = Arc::new(SyncCoordinator::new(
            pool,
            Arc::new(cache.clone()),
            Arc::new(cache.clone()),
        ));
        let router = EventRouter::new(coordinator.clone());
        Self {
            store,
            cache,
            coordinator,
            router,
        }
    }

    pub fn keys(&self) -> KeySpace {
        self.cache.keys().clone()
    }

    pub fn pool(&self) -> &SessionPool {
        self.coordinator.pool()
    }
}

/// Ordered record of store and cache steps across concurrent operations
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<&'static str>>>,
}

impl Journal {
    pub fn push(&self, entry: &'static str) {
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.lock().clone()
    }
}

/// Session source that journals every session it opens
pub struct JournaledSource {
    pub inner: MemoryStore,
    pub journal: Journal,
}

#[async_trait]
impl SessionSource for JournaledSource {
    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn open(&self) -> anyhow::Result<Box<dyn StoreSession>> {
        self.journal.push("store");
        let session = self.inner.open().await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(session)
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.inner.health_check().await
    }
}

/// Projector that journals each mutation after a short delay
pub struct JournaledProjector {
    pub inner: MemoryCoordinationStore,
    pub journal: Journal,
}

#[async_trait]
impl CacheProjector for JournaledProjector {
    fn keys(&self) -> &KeySpace {
        self.inner.keys()
    }

    async fn execute(&self, batch: &CommandBatch) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(3)).await;
        self.inner.execute(batch).await?;
        self.journal.push("cache");
        Ok(())
    }

    async fn run_script(&self, script: &ProjectionScript) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(3)).await;
        self.inner.run_script(script).await?;
        self.journal.push("cache");
        Ok(())
    }
}

#[async_trait]
impl NodeNotifier for JournaledProjector {
    async fn notify(&self, notification: &RefreshNotification) -> anyhow::Result<()> {
        self.inner.notify(notification).await
    }
}

pub fn group_envelope(kind: &str, id: &str) -> Vec<u8> {
    format!(r#"{{"type":"{kind}","data":"{id}"}}"#).into_bytes()
}
