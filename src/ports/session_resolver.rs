//! SessionResolver port - identity of a connecting client.
//!
//! Authentication happens upstream. By the time a WebSocket upgrade reaches
//! this service the session has been checked; the resolver only extracts
//! who the client is.

use async_trait::async_trait;
use http::HeaderMap;

use crate::domain::foundation::{UserId, WorkspaceId};

/// The authenticated identity a connection is seeded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// No identity on the request.
    #[error("missing session")]
    Missing,

    /// Identity present but unusable.
    #[error("invalid session: {0}")]
    Invalid(String),

    #[error("session service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<SessionIdentity, SessionError>;
}
