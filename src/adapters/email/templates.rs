//! Email rendering for notification kinds.
//!
//! One arm per [`NotificationKind`] variant. Every string that came from a
//! user (titles, names, comment excerpts) passes through [`html_escape`]
//! before it is placed in the HTML body.

use crate::domain::notification::{NotificationContent, NotificationKind};

/// Rendered subject and bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

struct Body {
    subject: String,
    headline: String,
    detail: Option<String>,
    action: &'static str,
    path: String,
}

fn body_for(content: &NotificationContent, actor: &str) -> Body {
    match &content.kind {
        NotificationKind::TaskAssigned {
            task_id,
            task_title,
            project_id,
        } => Body {
            subject: format!("{} assigned you to \"{}\"", actor, task_title),
            headline: format!("{} assigned you a task: {}", actor, task_title),
            detail: None,
            action: "View task",
            path: format!("/projects/{}/tasks/{}", project_id, task_id),
        },
        NotificationKind::TaskStatusChanged {
            task_id,
            task_title,
            project_id,
            from_status,
            to_status,
        } => Body {
            subject: format!("\"{}\" moved to {}", task_title, to_status),
            headline: format!(
                "{} moved {} from {} to {}",
                actor, task_title, from_status, to_status
            ),
            detail: None,
            action: "View task",
            path: format!("/projects/{}/tasks/{}", project_id, task_id),
        },
        NotificationKind::TaskDueSoon {
            task_id,
            task_title,
            project_id,
            due_at,
        } => Body {
            subject: format!("\"{}\" is due soon", task_title),
            headline: format!("{} is due soon", task_title),
            detail: Some(format!(
                "Due {}",
                due_at.as_datetime().format("%Y-%m-%d %H:%M UTC")
            )),
            action: "Open task",
            path: format!("/projects/{}/tasks/{}", project_id, task_id),
        },
        NotificationKind::CommentAdded {
            task_id,
            task_title,
            comment_id,
            excerpt,
        } => Body {
            subject: format!("New comment on \"{}\"", task_title),
            headline: format!("{} commented on {}", actor, task_title),
            detail: Some(excerpt.clone()),
            action: "Reply",
            path: format!("/tasks/{}#comment-{}", task_id, comment_id),
        },
        NotificationKind::Mentioned {
            task_id,
            task_title,
            comment_id,
            excerpt,
        } => Body {
            subject: format!("{} mentioned you in \"{}\"", actor, task_title),
            headline: format!("{} mentioned you in {}", actor, task_title),
            detail: Some(excerpt.clone()),
            action: "View comment",
            path: format!("/tasks/{}#comment-{}", task_id, comment_id),
        },
        NotificationKind::WorkspaceInvitation {
            workspace_id,
            workspace_name,
            role,
        } => Body {
            subject: format!("{} invited you to {}", actor, workspace_name),
            headline: format!(
                "{} invited you to join {} as {}",
                actor, workspace_name, role
            ),
            detail: None,
            action: "Accept invitation",
            path: format!("/workspaces/{}/join", workspace_id),
        },
    }
}

/// Render a notification into an email.
///
/// `app_url` is the base for the action link when the content carries none.
pub fn render(
    content: &NotificationContent,
    recipient_name: Option<&str>,
    app_url: &str,
) -> RenderedEmail {
    let actor = content.actor_name.as_deref().unwrap_or("Someone");
    let body = body_for(content, actor);
    let link = content
        .link
        .clone()
        .unwrap_or_else(|| format!("{}{}", app_url.trim_end_matches('/'), body.path));
    let greeting = recipient_name.unwrap_or("there");

    let mut text = format!("Hi {},\n\n{}\n", greeting, body.headline);
    if !content.message.is_empty() {
        text.push_str(&format!("\n{}\n", content.message));
    }
    if let Some(detail) = &body.detail {
        text.push_str(&format!("\n> {}\n", detail));
    }
    text.push_str(&format!("\n{}: {}\n", body.action, link));

    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"font-family:sans-serif\">");
    html.push_str(&format!("<p>Hi {},</p>", html_escape(greeting)));
    html.push_str(&format!("<h2>{}</h2>", html_escape(&body.headline)));
    if !content.message.is_empty() {
        html.push_str(&format!("<p>{}</p>", html_escape(&content.message)));
    }
    if let Some(detail) = &body.detail {
        html.push_str(&format!(
            "<blockquote>{}</blockquote>",
            html_escape(detail)
        ));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">{}</a></p>",
        html_escape(&link),
        html_escape(body.action)
    ));
    html.push_str("</body></html>");

    RenderedEmail {
        subject: body.subject,
        html,
        text,
    }
}
