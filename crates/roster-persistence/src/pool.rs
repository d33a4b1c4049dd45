//! Bounded session pool over a `SessionSource`
//!
//! Each acquisition takes a slot from a semaphore sized to the pool capacity.
//! The slot is held by a `SessionLease` whose `Drop` returns it, so a slot is
//! released exactly once on every exit path: after commit/rollback, when an
//! unreleased session is dropped, and when opening the session failed.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use roster_common::{DEFAULT_SESSION_POOL_SIZE, Result, SyncError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::model::StorageMode;
use crate::traits::{SessionSource, StoreSession};

/// Session pool configuration
#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    /// Maximum number of sessions open at once
    pub max_sessions: usize,
    /// How long `acquire_session` waits for a free slot
    pub acquire_timeout: Duration,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_SESSION_POOL_SIZE,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// How a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Commit,
    Rollback,
}

impl SessionOutcome {
    pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
        if result.is_ok() {
            SessionOutcome::Commit
        } else {
            SessionOutcome::Rollback
        }
    }
}

#[derive(Default)]
struct PoolStats {
    acquired: AtomicU64,
    released: AtomicU64,
    open_failures: AtomicU64,
}

/// Point-in-time view of the pool bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub available: usize,
    pub acquired: u64,
    pub released: u64,
    pub open_failures: u64,
}

/// Pooled persistent-store gateway
#[derive(Clone)]
pub struct SessionPool {
    source: Arc<dyn SessionSource>,
    permits: Arc<Semaphore>,
    config: SessionPoolConfig,
    stats: Arc<PoolStats>,
}

impl SessionPool {
    pub fn new(source: Arc<dyn SessionSource>, config: SessionPoolConfig) -> Self {
        let capacity = config.max_sessions.max(1);
        Self {
            source,
            permits: Arc::new(Semaphore::new(capacity)),
            config: SessionPoolConfig {
                max_sessions: capacity,
                ..config
            },
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.source.storage_mode()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_sessions
    }

    /// Number of sessions that can be acquired without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            capacity: self.capacity(),
            available: self.available(),
            acquired: self.stats.acquired.load(Ordering::Relaxed),
            released: self.stats.released.load(Ordering::Relaxed),
            open_failures: self.stats.open_failures.load(Ordering::Relaxed),
        }
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.source.health_check().await
    }

    /// Acquire a session, waiting for a free slot up to the configured timeout.
    ///
    /// If opening the session fails the slot has already been returned when
    /// this function yields the error.
    pub async fn acquire_session(&self) -> Result<PooledSession> {
        let permit = match tokio::time::timeout(
            self.config.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(e)) => return Err(SyncError::acquisition("session pool closed", e)),
            Err(_) => {
                return Err(SyncError::ResourceAcquisition(format!(
                    "no session available within {:?} (capacity {})",
                    self.config.acquire_timeout,
                    self.capacity()
                )));
            }
        };

        self.stats.acquired.fetch_add(1, Ordering::Relaxed);
        let lease = SessionLease {
            _permit: permit,
            stats: self.stats.clone(),
        };

        match self.source.open().await {
            Ok(session) => {
                debug!(available = self.available(), "Session acquired");
                Ok(PooledSession {
                    session,
                    _lease: lease,
                })
            }
            Err(e) => {
                self.stats.open_failures.fetch_add(1, Ordering::Relaxed);
                drop(lease);
                warn!(error = %e, "Failed to open store session");
                Err(SyncError::acquisition("open session", e))
            }
        }
    }
}

/// Holds one pool slot; returns it when dropped
struct SessionLease {
    _permit: OwnedSemaphorePermit,
    stats: Arc<PoolStats>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// A session checked out of the pool
///
/// Dropping it without calling `release` rolls the session back (backends
/// discard uncommitted work on drop) and returns the slot.
pub struct PooledSession {
    session: Box<dyn StoreSession>,
    _lease: SessionLease,
}

impl PooledSession {
    /// End the session and return its slot to the pool.
    pub async fn release(self, outcome: SessionOutcome) -> Result<()> {
        let PooledSession { session, _lease } = self;
        let result = match outcome {
            SessionOutcome::Commit => session.commit().await,
            SessionOutcome::Rollback => session.rollback().await,
        };
        drop(_lease);
        result.map_err(|e| match outcome {
            SessionOutcome::Commit => SyncError::store("commit session", e),
            SessionOutcome::Rollback => SyncError::store("roll back session", e),
        })
    }
}

impl Deref for PooledSession {
    type Target = dyn StoreSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}
