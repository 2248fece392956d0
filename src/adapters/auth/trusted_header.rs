//! Session resolver that trusts identity headers from the auth gateway.
//!
//! The gateway in front of this service validates the user's session and
//! forwards `x-user-id` / `x-workspace-id`. This service must not be exposed
//! without that gateway.

use async_trait::async_trait;
use http::HeaderMap;

use crate::domain::foundation::{UserId, WorkspaceId};
use crate::ports::{SessionError, SessionIdentity, SessionResolver};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const WORKSPACE_ID_HEADER: &str = "x-workspace-id";

#[derive(Debug, Clone)]
pub struct TrustedHeaderSessionResolver {
    user_header: String,
    workspace_header: String,
}

impl TrustedHeaderSessionResolver {
    pub fn new(user_header: impl Into<String>, workspace_header: impl Into<String>) -> Self {
        Self {
            user_header: user_header.into(),
            workspace_header: workspace_header.into(),
        }
    }
}

impl Default for TrustedHeaderSessionResolver {
    fn default() -> Self {
        Self::new(USER_ID_HEADER, WORKSPACE_ID_HEADER)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, SessionError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| SessionError::Invalid(format!("{} is not valid text", name))),
    }
}

#[async_trait]
impl SessionResolver for TrustedHeaderSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<SessionIdentity, SessionError> {
        let user = header(headers, &self.user_header)?.ok_or(SessionError::Missing)?;
        let workspace = header(headers, &self.workspace_header)?.ok_or(SessionError::Missing)?;

        let user_id = UserId::new(user).map_err(|e| SessionError::Invalid(e.to_string()))?;
        let workspace_id =
            WorkspaceId::new(workspace).map_err(|e| SessionError::Invalid(e.to_string()))?;

        Ok(SessionIdentity {
            user_id,
            workspace_id,
        })
    }
}
