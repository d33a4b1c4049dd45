//! Change envelopes received on the bus
//!
//! Every channel carries JSON of the form `{"type": "...", "data": "<id>"}`.
//! The group and user channels decode `type` into a closed enum; the
//! membership channel has a single kind of event and ignores it.

use serde::Deserialize;

use roster_common::{ChangeChannel, ChangeOperation, Result, SyncError, is_valid_subject_id};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum GroupEvent {
    Add(String),
    Update(String),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum UserEvent {
    Add(String),
    Update(String),
    Remove(String),
}

/// Full re-sync request for one group's member set
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MembershipEvent {
    #[serde(rename = "data")]
    pub group_id: String,
}

/// A decoded change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Group(GroupEvent),
    User(UserEvent),
    Membership(MembershipEvent),
}

impl ChangeEvent {
    /// Decode a raw envelope received on `channel`.
    pub fn decode(channel: ChangeChannel, payload: &[u8]) -> Result<Self> {
        let event = match channel {
            ChangeChannel::Group => serde_json::from_slice(payload).map(ChangeEvent::Group),
            ChangeChannel::User => serde_json::from_slice(payload).map(ChangeEvent::User),
            ChangeChannel::Membership => {
                serde_json::from_slice(payload).map(ChangeEvent::Membership)
            }
        }
        .map_err(|e| SyncError::decode(channel, e))?;

        if !is_valid_subject_id(event.subject_id()) {
            return Err(SyncError::decode(
                channel,
                format!("invalid subject id {:?}", event.subject_id()),
            ));
        }
        Ok(event)
    }

    pub fn channel(&self) -> ChangeChannel {
        match self {
            ChangeEvent::Group(_) => ChangeChannel::Group,
            ChangeEvent::User(_) => ChangeChannel::User,
            ChangeEvent::Membership(_) => ChangeChannel::Membership,
        }
    }

    pub fn operation(&self) -> ChangeOperation {
        match self {
            ChangeEvent::Group(GroupEvent::Add(_)) | ChangeEvent::User(UserEvent::Add(_)) => {
                ChangeOperation::Add
            }
            ChangeEvent::Group(GroupEvent::Update(_)) | ChangeEvent::User(UserEvent::Update(_)) => {
                ChangeOperation::Update
            }
            ChangeEvent::Group(GroupEvent::Remove(_)) | ChangeEvent::User(UserEvent::Remove(_)) => {
                ChangeOperation::Remove
            }
            ChangeEvent::Membership(_) => ChangeOperation::Refresh,
        }
    }

    pub fn subject_id(&self) -> &str {
        match self {
            ChangeEvent::Group(
                GroupEvent::Add(id) | GroupEvent::Update(id) | GroupEvent::Remove(id),
            ) => id,
            ChangeEvent::User(UserEvent::Add(id) | UserEvent::Update(id) | UserEvent::Remove(id)) => {
                id
            }
            ChangeEvent::Membership(event) => &event.group_id,
        }
    }
}
