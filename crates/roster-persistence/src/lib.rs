//! Roster Persistence - Persistent store gateway
//!
//! This crate provides:
//! - SeaORM entity definitions for groups, users and memberships
//! - The `StoreSession`/`SessionSource` abstraction over storage backends
//! - A bounded `SessionPool` with release-exactly-once leases
//! - SQL (SeaORM) and in-memory backends

pub mod entity;
pub mod memory;
pub mod model;
pub mod pool;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export entity prelude
pub use entity::prelude::*;

pub use memory::{MemoryStore, StoreOp, StoreSnapshot};
pub use model::{GroupMembership, GroupRecord, StorageMode, UserCriteria, UserRecord};
pub use pool::{PoolSnapshot, PooledSession, SessionOutcome, SessionPool, SessionPoolConfig};
pub use sql::SqlSessionSource;
pub use traits::{SessionSource, StoreSession};
