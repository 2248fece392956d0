//! Internal HTTP endpoints that drive the notification service.
//!
//! These are called by the services that own tasks, comments and
//! workspaces. Authorization has already happened upstream; the caller
//! identity for read-state changes comes from the [`SessionResolver`].
//!
//! # Routes
//! - `POST /internal/notifications` - Fan a draft out to explicit recipients
//! - `POST /internal/notifications/watchers` - Fan a draft out to an entity's watchers
//! - `POST /internal/notifications/:id/read` - Mark one notification read
//! - `POST /internal/notifications/read-all` - Mark all of the caller's notifications read
//! - `POST /internal/events` - Broadcast an entity change

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::application::{FanoutReport, NotificationService};
use crate::domain::foundation::{DomainError, ErrorCode, NotificationId, UserId};
use crate::domain::notification::{Actor, EntityRef, Notification, NotificationDraft, NotificationKind, Recipient};
use crate::domain::realtime::{EntityType, RealtimeEvent, Room};
use crate::ports::SessionResolver;

#[derive(Clone)]
pub struct NotificationsState {
    pub service: Arc<NotificationService>,
    pub sessions: Arc<dyn SessionResolver>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Request / Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Draft as sent over the wire; validated into a [`NotificationDraft`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub actor: Option<Actor>,
    pub link: Option<String>,
}

impl DraftRequest {
    fn into_draft(self) -> Result<NotificationDraft, DomainError> {
        let mut draft = NotificationDraft::new(self.kind, self.title, self.message)?;
        if let Some(actor) = self.actor {
            draft = draft.with_actor(actor);
        }
        if let Some(link) = self.link {
            draft = draft.with_link(link);
        }
        Ok(draft)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequest {
    pub recipients: Vec<Recipient>,
    pub draft: DraftRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyWatchersRequest {
    pub entity: EntityRef,
    pub draft: DraftRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishChangeRequest {
    pub entity_type: EntityType,
    /// Client-facing type, e.g. `task.updated`.
    pub event_type: String,
    pub room: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub origin_user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadAllResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct PublishChangeResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// A [`DomainError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::foundation::ValidationError> for ApiError {
    fn from(err: crate::domain::foundation::ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0.code {
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,
            ErrorCode::NotificationNotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::BrokerUnavailable | ErrorCode::QueueUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = ErrorResponse {
            code: self.0.code.to_string(),
            message: self.0.message,
        };
        (status, Json(body)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

async fn caller(state: &NotificationsState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    state
        .sessions
        .resolve(headers)
        .await
        .map(|identity| identity.user_id)
        .map_err(|e| ApiError(DomainError::new(ErrorCode::Unauthorized, e.to_string())))
}

pub async fn notify(
    State(state): State<NotificationsState>,
    Json(request): Json<NotifyRequest>,
) -> Result<(StatusCode, Json<FanoutReport>), ApiError> {
    let draft = request.draft.into_draft()?;
    let report = state.service.notify(request.recipients, draft).await;
    Ok((StatusCode::ACCEPTED, Json(report)))
}

pub async fn notify_watchers(
    State(state): State<NotificationsState>,
    Json(request): Json<NotifyWatchersRequest>,
) -> Result<(StatusCode, Json<FanoutReport>), ApiError> {
    let draft = request.draft.into_draft()?;
    let report = state
        .service
        .notify_watchers(&request.entity, draft)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(report)))
}

pub async fn mark_read(
    State(state): State<NotificationsState>,
    headers: HeaderMap,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, ApiError> {
    let user_id = caller(&state, &headers).await?;
    let notification = state.service.mark_read(id, &user_id).await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<NotificationsState>,
    headers: HeaderMap,
) -> Result<Json<ReadAllResponse>, ApiError> {
    let user_id = caller(&state, &headers).await?;
    let count = state.service.mark_all_read(&user_id).await?;
    Ok(Json(ReadAllResponse { count }))
}

pub async fn publish_change(
    State(state): State<NotificationsState>,
    Json(request): Json<PublishChangeRequest>,
) -> Result<Json<PublishChangeResponse>, ApiError> {
    if request.event_type.trim().is_empty() {
        return Err(DomainError::validation("eventType", "Event type is required").into());
    }
    let room = Room::parse(request.room)?;
    let origin = request.origin_user_id.map(UserId::new).transpose()?;

    let event = RealtimeEvent::entity_change(
        request.entity_type,
        request.event_type,
        room,
        request.payload,
        origin,
    );
    let delivered = state.service.publish_change(event).await?;
    Ok(Json(PublishChangeResponse { delivered }))
}

/// Routes mounted under `/internal`.
pub fn notifications_router() -> Router<NotificationsState> {
    Router::new()
        .route("/internal/notifications", post(notify))
        .route("/internal/notifications/watchers", post(notify_watchers))
        .route("/internal/notifications/read-all", post(mark_all_read))
        .route("/internal/notifications/:id/read", post(mark_read))
        .route("/internal/events", post(publish_change))
}
