//! Notification kinds.
//!
//! One variant per notification type. Rendering and prioritisation match
//! exhaustively on this enum, so adding a type is a compile-checked change.

use serde::{Deserialize, Serialize};

use super::{EntityRef, Priority};
use crate::domain::foundation::Timestamp;
use crate::domain::realtime::EntityType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned {
        task_id: String,
        task_title: String,
        project_id: String,
    },
    TaskStatusChanged {
        task_id: String,
        task_title: String,
        project_id: String,
        from_status: String,
        to_status: String,
    },
    TaskDueSoon {
        task_id: String,
        task_title: String,
        project_id: String,
        due_at: Timestamp,
    },
    CommentAdded {
        task_id: String,
        task_title: String,
        comment_id: String,
        excerpt: String,
    },
    Mentioned {
        task_id: String,
        task_title: String,
        comment_id: String,
        excerpt: String,
    },
    WorkspaceInvitation {
        workspace_id: String,
        workspace_name: String,
        role: String,
    },
}

impl NotificationKind {
    /// Stable type name stored on the notification record.
    pub fn type_name(&self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned { .. } => "task_assigned",
            NotificationKind::TaskStatusChanged { .. } => "task_status_changed",
            NotificationKind::TaskDueSoon { .. } => "task_due_soon",
            NotificationKind::CommentAdded { .. } => "comment_added",
            NotificationKind::Mentioned { .. } => "mentioned",
            NotificationKind::WorkspaceInvitation { .. } => "workspace_invitation",
        }
    }

    /// Scheduling hint for the email delivery queue.
    pub fn default_priority(&self) -> Priority {
        match self {
            NotificationKind::TaskDueSoon { .. } => Priority::Critical,
            NotificationKind::TaskAssigned { .. } | NotificationKind::Mentioned { .. } => {
                Priority::High
            }
            NotificationKind::TaskStatusChanged { .. }
            | NotificationKind::WorkspaceInvitation { .. } => Priority::Normal,
            NotificationKind::CommentAdded { .. } => Priority::Low,
        }
    }

    /// The entity this notification points at.
    pub fn entity(&self) -> EntityRef {
        match self {
            NotificationKind::TaskAssigned { task_id, .. }
            | NotificationKind::TaskStatusChanged { task_id, .. }
            | NotificationKind::TaskDueSoon { task_id, .. } => {
                EntityRef::new(EntityType::Task, task_id.clone())
            }
            NotificationKind::CommentAdded { comment_id, .. }
            | NotificationKind::Mentioned { comment_id, .. } => {
                EntityRef::new(EntityType::Comment, comment_id.clone())
            }
            NotificationKind::WorkspaceInvitation { workspace_id, .. } => {
                EntityRef::new(EntityType::Workspace, workspace_id.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned() -> NotificationKind {
        NotificationKind::TaskAssigned {
            task_id: "t1".into(),
            task_title: "Write docs".into(),
            project_id: "p1".into(),
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(assigned()).unwrap();
        assert_eq!(json["type"], "task_assigned");
        assert_eq!(json["task_id"], "t1");
    }

    #[test]
    fn type_name_matches_serde_tag() {
        let kinds = vec![
            assigned(),
            NotificationKind::Mentioned {
                task_id: "t".into(),
                task_title: "T".into(),
                comment_id: "c".into(),
                excerpt: "hi".into(),
            },
            NotificationKind::WorkspaceInvitation {
                workspace_id: "w".into(),
                workspace_name: "W".into(),
                role: "member".into(),
            },
        ];
        for kind in kinds {
            let json = serde_json::to_value(&kind).unwrap();
            assert_eq!(json["type"], kind.type_name());
        }
    }

    #[test]
    fn comment_kinds_point_at_comment() {
        let kind = NotificationKind::CommentAdded {
            task_id: "t".into(),
            task_title: "T".into(),
            comment_id: "c9".into(),
            excerpt: "looks good".into(),
        };
        let entity = kind.entity();
        assert_eq!(entity.entity_type, EntityType::Comment);
        assert_eq!(entity.entity_id, "c9");
        assert_eq!(kind.default_priority(), Priority::Low);
    }

    #[test]
    fn assignment_is_high_priority() {
        assert_eq!(assigned().default_priority(), Priority::High);
        assert_eq!(assigned().entity().entity_type, EntityType::Task);
    }
}
