//! Collaborator contracts of the sync engine on the coordination-store side

use async_trait::async_trait;

use crate::command::{CommandBatch, ProjectionScript};
use crate::keys::KeySpace;
use crate::notification::RefreshNotification;

/// Writes the derived projection into the coordination store
#[async_trait]
pub trait CacheProjector: Send + Sync {
    /// Key layout used by this projector
    fn keys(&self) -> &KeySpace;

    /// Apply a batch of simple index writes atomically
    async fn execute(&self, batch: &CommandBatch) -> anyhow::Result<()>;

    /// Run a multi-key mutation atomically
    async fn run_script(&self, script: &ProjectionScript) -> anyhow::Result<()>;
}

/// Signals downstream nodes that a slice of the projection changed
#[async_trait]
pub trait NodeNotifier: Send + Sync {
    async fn notify(&self, notification: &RefreshNotification) -> anyhow::Result<()>;
}
