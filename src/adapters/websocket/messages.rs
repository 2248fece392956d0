//! WebSocket message types for live notification delivery.
//!
//! Defines the protocol between server and connected clients:
//! - Server → Client: Connection status, room events, subscription acks, errors, pongs
//! - Client → Server: Room subscribe/unsubscribe, pings

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConnectionId, Timestamp, UserId, WorkspaceId};
use crate::domain::realtime::{RealtimeEvent, Room};

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established successfully.
    Connected(ConnectedMessage),

    /// A live event for a room the client is in.
    Event(EventMessage),

    /// Room subscription confirmed.
    Subscribed(RoomAck),

    /// Room unsubscription confirmed.
    Unsubscribed(RoomAck),

    /// Error occurred.
    Error(ErrorMessage),

    /// Heartbeat response.
    Pong(PongMessage),
}

/// Sent once after the upgrade completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub connection_id: String,
    pub user_id: String,
    pub workspace_id: String,
    pub timestamp: String,
}

impl ConnectedMessage {
    pub fn new(connection_id: ConnectionId, user_id: &UserId, workspace_id: &WorkspaceId) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            user_id: user_id.to_string(),
            workspace_id: workspace_id.to_string(),
            timestamp: now_rfc3339(),
        }
    }
}

/// A live event as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    /// Event type, e.g. `task.updated` or `notification.new`.
    pub event: String,
    pub room: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}

impl EventMessage {
    pub fn from_event(event: &RealtimeEvent) -> Self {
        Self {
            event: event.event_type.clone(),
            room: event.target_room.to_string(),
            data: event.payload.clone(),
            timestamp: event.occurred_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Acknowledges a subscribe/unsubscribe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomAck {
    pub room: String,
}

/// Error message sent to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }
}

/// Heartbeat response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongMessage {
    pub timestamp: String,
}

impl ServerMessage {
    pub fn event(event: &RealtimeEvent) -> Self {
        ServerMessage::Event(EventMessage::from_event(event))
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage::new(code, message))
    }

    pub fn pong() -> Self {
        ServerMessage::Pong(PongMessage {
            timestamp: now_rfc3339(),
        })
    }

    pub fn subscribed(room: &Room) -> Self {
        ServerMessage::Subscribed(RoomAck {
            room: room.to_string(),
        })
    }

    pub fn unsubscribed(room: &Room) -> Self {
        ServerMessage::Unsubscribed(RoomAck {
            room: room.to_string(),
        })
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room, e.g. `project:42`.
    Subscribe { room: String },

    /// Leave a room.
    Unsubscribe { room: String },

    /// Heartbeat request.
    Ping,
}

// ============================================
// Error codes
// ============================================

pub const ERROR_INVALID_MESSAGE: &str = "INVALID_MESSAGE";
pub const ERROR_INVALID_ROOM: &str = "INVALID_ROOM";
pub const ERROR_FORBIDDEN_ROOM: &str = "FORBIDDEN_ROOM";
pub const ERROR_RATE_LIMITED: &str = "rate_limited";

fn now_rfc3339() -> String {
    Timestamp::now().as_datetime().to_rfc3339()
}
