//! Coordination-store side of Roster
//!
//! Holds the key layout, the mutations the sync engine issues against the
//! coordination store, and the two backends implementing them: Redis for
//! deployments and an in-memory store for standalone runs and tests.

pub mod command;
pub mod keys;
pub mod memory;
pub mod notification;
pub mod redis;
pub mod traits;

pub use command::{CacheCommand, CommandBatch, ProjectionScript};
pub use keys::KeySpace;
pub use memory::{CacheOp, CacheValue, MemoryCoordinationStore};
pub use notification::{RefreshNotification, RefreshScope};
pub use crate::redis::{RedisConfig, RedisCoordinationStore};
pub use traits::{CacheProjector, NodeNotifier};
