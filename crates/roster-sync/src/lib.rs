//! Roster Sync - Synchronization engine
//!
//! This crate provides:
//! - Envelope decoding for the group, user and membership channels
//! - The `EventRouter`, which dispatches decoded events
//! - The `SyncCoordinator`, which applies each event across the persistent
//!   store, the cache projection and node notifications under one lock
//! - Metrics helpers shared with the server binary

pub mod coordinator;
pub mod envelope;
pub mod metrics;
pub mod projection;
pub mod router;

pub use coordinator::SyncCoordinator;
pub use envelope::{ChangeEvent, GroupEvent, MembershipEvent, UserEvent};
pub use router::EventRouter;
