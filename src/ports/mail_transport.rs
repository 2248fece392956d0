//! MailTransport port - the outbound email boundary.
//!
//! Implementations talk to an external mail service. The channel sender
//! wraps every call in a circuit breaker, so implementations must classify
//! their failures: transient trouble counts against the breaker, a
//! permanent rejection of one message does not.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::notification::EmailAddress;

/// A fully rendered email ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub to: EmailAddress,
    pub to_name: Option<String>,
    pub from: String,
    pub from_name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// Lets the downstream service drop repeats of the same message.
    pub idempotency_key: Option<String>,
}

/// Acknowledgement from the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportReceipt {
    /// Provider-assigned message id, when the provider returns one.
    pub message_id: Option<String>,
}

/// Errors from a send attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The service understood the request and refused this message.
    #[error("message rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The service is down, overloaded, or unreachable.
    #[error("mail service unavailable: {0}")]
    Unavailable(String),

    /// No answer within the client timeout.
    #[error("mail service timed out")]
    Timeout,
}

impl TransportError {
    /// True if this failure says something about the service's health.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable(_) | TransportError::Timeout)
    }
}

/// Port for sending email.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_not_transient() {
        let err = TransportError::Rejected {
            status: 422,
            body: "bad".into(),
        };
        assert!(!err.is_transient());
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Unavailable("503".into()).is_transient());
    }

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn MailTransport) {}
}
