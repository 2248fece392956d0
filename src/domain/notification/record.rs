//! Durable notification record and the inputs used to create it.

use serde::{Deserialize, Serialize};

use super::NotificationKind;
use crate::domain::foundation::{NotificationId, Timestamp, UserId, ValidationError};
use crate::domain::realtime::EntityType;

/// Upper bound on title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Upper bound on message length, in characters.
pub const MAX_MESSAGE_LEN: usize = 5_000;

/// Reference to the entity a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

/// The user whose action triggered a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
}

/// Someone who should be told about a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: UserId,
    /// Unvalidated; checked when an email job is built.
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Recipient {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Everything needed to create the same notification for many recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub actor: Option<Actor>,
    /// Deep link into the web app, when one exists.
    pub link: Option<String>,
}

impl NotificationDraft {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        let message = message.into();
        if title.trim().is_empty() {
            return Err(ValidationError::empty_field("title"));
        }
        let title_len = title.chars().count();
        if title_len > MAX_TITLE_LEN {
            return Err(ValidationError::out_of_range(
                "title",
                1,
                MAX_TITLE_LEN as i64,
                title_len as i64,
            ));
        }
        let message_len = message.chars().count();
        if message_len > MAX_MESSAGE_LEN {
            return Err(ValidationError::out_of_range(
                "message",
                0,
                MAX_MESSAGE_LEN as i64,
                message_len as i64,
            ));
        }
        Ok(Self {
            kind,
            title,
            message,
            actor: None,
            link: None,
        })
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// A notification owned by one user.
///
/// Created once per recipient; afterwards only the read state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub data: serde_json::Value,
    pub read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Notification {
    /// Materialises a draft for one recipient.
    pub fn from_draft(user_id: UserId, draft: &NotificationDraft) -> Self {
        let entity = draft.kind.entity();
        let mut data = serde_json::to_value(&draft.kind).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut data {
            if let Some(actor) = &draft.actor {
                map.insert("actorId".into(), actor.user_id.as_str().into());
                map.insert("actorName".into(), actor.display_name.clone().into());
            }
            if let Some(link) = &draft.link {
                map.insert("link".into(), link.clone().into());
            }
        }

        Self {
            id: NotificationId::new(),
            user_id,
            notification_type: draft.kind.type_name().to_string(),
            title: draft.title.clone(),
            message: draft.message.clone(),
            entity_type: Some(entity.entity_type),
            entity_id: Some(entity.entity_id),
            data,
            read: false,
            read_at: None,
            created_at: Timestamp::now(),
        }
    }

    /// Marks the notification read. Returns false if it already was.
    pub fn mark_read(&mut self, at: Timestamp) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(at);
        true
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
