//! Room names.
//!
//! A room is a named broadcast group of live connections. Names are always
//! `namespace:key`, e.g. `project:42` or `user:alice`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{UserId, ValidationError, WorkspaceId};

const MAX_ROOM_LEN: usize = 200;

/// Namespace of the implicit per-user room.
pub const PERSONAL_NAMESPACE: &str = "user";

/// Validated room name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Room(String);

impl Room {
    /// Parses a room name, rejecting anything that is not `namespace:key`.
    pub fn parse(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("room"));
        }
        if name.len() > MAX_ROOM_LEN {
            return Err(ValidationError::out_of_range(
                "room",
                1,
                MAX_ROOM_LEN as i64,
                name.len() as i64,
            ));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::invalid_format(
                "room",
                "must not contain whitespace",
            ));
        }
        match name.split_once(':') {
            Some((namespace, key)) if !namespace.is_empty() && !key.is_empty() => {
                if !namespace
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(ValidationError::invalid_format(
                        "room",
                        "namespace must be alphanumeric",
                    ));
                }
                Ok(Self(name))
            }
            _ => Err(ValidationError::invalid_format(
                "room",
                "expected namespace:key",
            )),
        }
    }

    /// Personal room of a user. Every connection is a member of its owner's.
    pub fn user(user_id: &UserId) -> Self {
        Self(format!("{}:{}", PERSONAL_NAMESPACE, user_id))
    }

    pub fn project(project_id: impl fmt::Display) -> Self {
        Self(format!("project:{}", project_id))
    }

    pub fn task(task_id: impl fmt::Display) -> Self {
        Self(format!("task:{}", task_id))
    }

    pub fn workspace(workspace_id: &WorkspaceId) -> Self {
        Self(format!("workspace:{}", workspace_id))
    }

    /// Part before the first `:`.
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Part after the first `:`.
    pub fn key(&self) -> &str {
        self.0.split_once(':').map(|(_, key)| key).unwrap_or("")
    }

    /// True for `user:*` rooms.
    pub fn is_personal(&self) -> bool {
        self.namespace() == PERSONAL_NAMESPACE
    }

    /// True if this is the personal room of `user_id`.
    pub fn is_personal_room_of(&self, user_id: &UserId) -> bool {
        self.is_personal() && self.key() == user_id.as_str()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Room {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Room {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Room> for String {
    fn from(room: Room) -> Self {
        room.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_namespace_and_key() {
        let room = Room::parse("project:42").unwrap();
        assert_eq!(room.namespace(), "project");
        assert_eq!(room.key(), "42");
    }

    #[test]
    fn key_may_contain_colons() {
        let room = Room::parse("task:a:b").unwrap();
        assert_eq!(room.namespace(), "task");
        assert_eq!(room.key(), "a:b");
    }

    #[test]
    fn parse_rejects_missing_key() {
        assert!(Room::parse("project:").is_err());
        assert!(Room::parse(":42").is_err());
        assert!(Room::parse("project").is_err());
    }

    #[test]
    fn parse_rejects_whitespace_and_empty() {
        assert!(Room::parse("").is_err());
        assert!(Room::parse("project: 1").is_err());
    }

    #[test]
    fn parse_rejects_overlong_name() {
        let name = format!("project:{}", "x".repeat(MAX_ROOM_LEN));
        assert!(matches!(
            Room::parse(name),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn personal_room_recognises_owner() {
        let alice = UserId::new("alice").unwrap();
        let bob = UserId::new("bob").unwrap();
        let room = Room::user(&alice);

        assert_eq!(room.as_str(), "user:alice");
        assert!(room.is_personal());
        assert!(room.is_personal_room_of(&alice));
        assert!(!room.is_personal_room_of(&bob));
        assert!(!Room::project(1).is_personal());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<Room, _> = serde_json::from_str("\"workspace:w1\"");
        assert!(ok.is_ok());
        let bad: Result<Room, _> = serde_json::from_str("\"nonsense\"");
        assert!(bad.is_err());
    }
}
