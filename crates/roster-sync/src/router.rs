//! Event router
//!
//! Decodes envelopes arriving on the three change channels and hands them to
//! the coordinator. Failures are reported to the caller unchanged; the router
//! never retries.

use std::sync::Arc;

use tracing::{debug, warn};

use roster_common::{ChangeChannel, Result};

use crate::coordinator::SyncCoordinator;
use crate::envelope::{ChangeEvent, GroupEvent, UserEvent};
use crate::metrics::{outcome_label, record_event};

#[derive(Clone)]
pub struct EventRouter {
    coordinator: Arc<SyncCoordinator>,
}

impl EventRouter {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Handle one raw envelope received on `channel`.
    pub async fn handle(&self, channel: ChangeChannel, payload: &[u8]) -> Result<()> {
        let event = match ChangeEvent::decode(channel, payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(%channel, error = %e, "Rejected change envelope");
                record_event(channel, "unknown", "decode");
                return Err(e);
            }
        };

        let result = self.dispatch(&event).await;

        let operation = event.operation();
        record_event(channel, operation.as_str(), outcome_label(&result));
        match &result {
            Ok(()) => debug!(%channel, %operation, subject = event.subject_id(), "Change event applied"),
            Err(e) => warn!(
                %channel,
                %operation,
                subject = event.subject_id(),
                kind = %e.kind(),
                error = %e,
                "Change event failed"
            ),
        }
        result
    }

    /// Apply an already decoded event.
    pub async fn dispatch(&self, event: &ChangeEvent) -> Result<()> {
        match event {
            ChangeEvent::Group(GroupEvent::Add(id)) => self.coordinator.apply_group_add(id).await,
            ChangeEvent::Group(GroupEvent::Remove(id)) => {
                self.coordinator.apply_group_remove(id).await
            }
            ChangeEvent::Group(GroupEvent::Update(id)) => {
                debug!(group_id = %id, "Ignoring group update");
                Ok(())
            }
            ChangeEvent::User(UserEvent::Add(id) | UserEvent::Update(id)) => {
                self.coordinator.apply_user_upsert(id).await
            }
            ChangeEvent::User(UserEvent::Remove(id)) => self.coordinator.apply_user_remove(id).await,
            ChangeEvent::Membership(event) => {
                self.coordinator
                    .apply_membership_refresh(&event.group_id)
                    .await
            }
        }
    }
}
