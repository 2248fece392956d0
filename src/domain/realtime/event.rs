//! Live events pushed to connected clients.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Room;
use crate::domain::foundation::{Timestamp, UserId, WorkspaceId};

/// Entities whose changes are broadcast live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Project,
    Comment,
    Workspace,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Project => "project",
            EntityType::Comment => "comment",
            EntityType::Workspace => "workspace",
        }
    }

    /// Inverse of [`EntityType::as_str`].
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            "task" => Some(EntityType::Task),
            "project" => Some(EntityType::Project),
            "comment" => Some(EntityType::Comment),
            "workspace" => Some(EntityType::Workspace),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event is about. Determines the broker channel it travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum EventKind {
    EntityChange(EntityType),
    Notification,
    Presence,
}

/// Broker channel prefix for personal notification events.
pub const NOTIFICATION_CHANNEL: &str = "notifications";

/// Broker channel prefix for presence events.
pub const PRESENCE_CHANNEL: &str = "presence";

/// An immutable live event addressed to one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub kind: EventKind,
    /// Client-facing type, e.g. `task.updated` or `notification.new`.
    pub event_type: String,
    pub target_room: Room,
    pub payload: serde_json::Value,
    /// The actor whose action produced the event; never receives its echo.
    pub origin_user_id: Option<UserId>,
    pub occurred_at: Timestamp,
}

impl RealtimeEvent {
    /// A task/project/comment/workspace mutation broadcast to `room`.
    pub fn entity_change(
        entity: EntityType,
        event_type: impl Into<String>,
        room: Room,
        payload: serde_json::Value,
        origin_user_id: Option<UserId>,
    ) -> Self {
        Self {
            kind: EventKind::EntityChange(entity),
            event_type: event_type.into(),
            target_room: room,
            payload,
            origin_user_id,
            occurred_at: Timestamp::now(),
        }
    }

    /// A per-recipient event delivered to the recipient's personal room.
    ///
    /// Notification events carry no origin actor: the recipient is never
    /// the actor, and every tab of the recipient must receive it.
    pub fn notification(
        recipient: &UserId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: EventKind::Notification,
            event_type: event_type.into(),
            target_room: Room::user(recipient),
            payload,
            origin_user_id: None,
            occurred_at: Timestamp::now(),
        }
    }

    /// Online/offline change of `user_id` within a workspace.
    pub fn presence(workspace_id: &WorkspaceId, user_id: &UserId, online: bool) -> Self {
        let event_type = if online {
            "presence.online"
        } else {
            "presence.offline"
        };
        Self {
            kind: EventKind::Presence,
            event_type: event_type.to_string(),
            target_room: Room::workspace(workspace_id),
            payload: serde_json::json!({ "userId": user_id, "online": online }),
            origin_user_id: Some(user_id.clone()),
            occurred_at: Timestamp::now(),
        }
    }

    /// Broker channel this event is published on.
    ///
    /// Entity changes use `{entity}:{room key}`, so a task change in
    /// `project:1` goes out on `task:1`.
    pub fn channel(&self) -> String {
        let key = self.target_room.key();
        match self.kind {
            EventKind::EntityChange(entity) => format!("{}:{}", entity, key),
            EventKind::Notification => format!("{}:{}", NOTIFICATION_CHANNEL, key),
            EventKind::Presence => format!("{}:{}", PRESENCE_CHANNEL, key),
        }
    }
}
