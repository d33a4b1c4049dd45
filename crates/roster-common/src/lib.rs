//! Roster Common - Shared types, errors, and constants
//!
//! This crate provides the foundational types used across all Roster components:
//! - The synchronization error taxonomy (`SyncError`, `ErrorKind`)
//! - Change channel and operation enums
//! - Common constants (default channel names, key prefix)

pub mod error;
pub mod model;

// Re-exports for convenience
pub use error::{ErrorKind, Result, SyncError};
pub use model::{ChangeChannel, ChangeOperation};

/// Default stream carrying group change envelopes
pub const DEFAULT_GROUP_CHANNEL: &str = "roster.group";

/// Default stream carrying user change envelopes
pub const DEFAULT_USER_CHANNEL: &str = "roster.user";

/// Default stream carrying group membership change envelopes
pub const DEFAULT_MEMBERSHIP_CHANNEL: &str = "roster.group_users";

/// Default consumer group shared by all sync processes
pub const DEFAULT_CONSUMER_GROUP: &str = "roster-sync";

/// Default prefix for every key written to the coordination store
pub const DEFAULT_KEY_PREFIX: &str = "roster";

/// Default number of refresh notifications kept for polling nodes
pub const DEFAULT_REFRESH_BACKLOG: usize = 1024;

/// Default persistent-store session pool size
pub const DEFAULT_SESSION_POOL_SIZE: usize = 8;

/// Returns true when a subject id is usable as a store key.
pub fn is_valid_subject_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.chars().any(char::is_whitespace)
}
