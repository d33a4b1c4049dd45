//! Error taxonomy for the synchronization engine
//!
//! Every pipeline step returns a `Result<T, SyncError>`. The first failure
//! short-circuits the remaining steps of an operation and is reported to the
//! bus adapter unmodified.

use std::fmt::Display;

use crate::model::ChangeChannel;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while applying a change event
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("malformed {channel} envelope: {message}")]
    Decode {
        channel: ChangeChannel,
        message: String,
    },

    #[error("session acquisition failed: {0}")]
    ResourceAcquisition(String),

    #[error("persistent store error: {0}")]
    PersistentStore(String),

    #[error("cache projection error: {0}")]
    CacheProjection(String),

    #[error("notification error: {0}")]
    Notification(String),
}

/// Coarse classification of a `SyncError`, used for logging and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Decode,
    ResourceAcquisition,
    PersistentStore,
    CacheProjection,
    Notification,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Decode => "decode",
            ErrorKind::ResourceAcquisition => "resource_acquisition",
            ErrorKind::PersistentStore => "persistent_store",
            ErrorKind::CacheProjection => "cache_projection",
            ErrorKind::Notification => "notification",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl SyncError {
    pub fn decode(channel: ChangeChannel, message: impl Display) -> Self {
        SyncError::Decode {
            channel,
            message: message.to_string(),
        }
    }

    pub fn acquisition(context: &str, err: impl Display) -> Self {
        SyncError::ResourceAcquisition(format!("{context}: {err:#}"))
    }

    pub fn store(context: &str, err: impl Display) -> Self {
        SyncError::PersistentStore(format!("{context}: {err:#}"))
    }

    pub fn projection(context: &str, err: impl Display) -> Self {
        SyncError::CacheProjection(format!("{context}: {err:#}"))
    }

    pub fn notification(context: &str, err: impl Display) -> Self {
        SyncError::Notification(format!("{context}: {err:#}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Decode { .. } => ErrorKind::Decode,
            SyncError::ResourceAcquisition(_) => ErrorKind::ResourceAcquisition,
            SyncError::PersistentStore(_) => ErrorKind::PersistentStore,
            SyncError::CacheProjection(_) => ErrorKind::CacheProjection,
            SyncError::Notification(_) => ErrorKind::Notification,
        }
    }

    /// Whether redelivering the same message can succeed.
    ///
    /// A malformed envelope stays malformed, so decode failures are the only
    /// permanent kind. The bus adapter still redelivers them unless it is
    /// configured to discard malformed messages.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Decode { .. })
    }
}
