//! Backend wiring
//!
//! Builds the session pool over the configured storage backend and the Redis
//! coordination store, then the coordinator and router on top of them.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use roster_cache::{CacheProjector, RedisCoordinationStore};
use roster_persistence::{MemoryStore, SessionPool, SessionSource, SqlSessionSource, StorageMode};
use roster_sync::{EventRouter, SyncCoordinator};

use crate::model::config::Configuration;

pub struct Services {
    pub router: EventRouter,
    /// Also opens the bus connections
    pub coordination: RedisCoordinationStore,
}

pub async fn build_services(configuration: &Configuration) -> anyhow::Result<Services> {
    let storage_mode = configuration.storage_mode()?;
    info!("Storage mode: {}", storage_mode);

    let source: Arc<dyn SessionSource> = match storage_mode {
        StorageMode::Sql => {
            let db = configuration.database_connection().await?;
            let source = SqlSessionSource::new(db);
            if configuration.auto_create_schema() {
                source.create_schema().await?;
            }
            Arc::new(source)
        }
        StorageMode::Memory => {
            warn!("Using the in-memory store, persisted state is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let pool = SessionPool::new(source, configuration.session_pool_config());
    pool.health_check()
        .await
        .context("persistent store health check")?;
    info!(capacity = pool.capacity(), "Session pool ready");

    let redis_config = configuration.redis_config();
    let coordination = RedisCoordinationStore::connect(&redis_config).await?;
    coordination
        .health_check()
        .await
        .context("coordination store health check")?;
    info!(prefix = %coordination.keys().prefix(), "Coordination store ready");

    let store = Arc::new(coordination.clone());
    let coordinator = Arc::new(SyncCoordinator::new(pool, store.clone(), store));

    Ok(Services {
        router: EventRouter::new(coordinator),
        coordination,
    })
}
