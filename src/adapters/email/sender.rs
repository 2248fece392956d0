//! EmailChannelSender - validated, breaker-guarded email sends.
//!
//! Order of operations for every send:
//!
//! 1. Validate recipient address and content bounds
//! 2. Consult the circuit breaker (fail fast while open)
//! 3. Render and hand the message to the transport
//! 4. Report the outcome to the breaker
//!
//! Malformed input is rejected in step 1 and never counts against the breaker.
//! A send dropped mid-flight (its caller timed out) counts as a failure, so a
//! half-open trial is never left without an outcome.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::ValidationError;
use crate::domain::notification::{DeliveryJob, EmailAddress};
use crate::ports::{CircuitBreaker, MailTransport, OutboundEmail, TransportError, TransportReceipt};

use super::templates;

/// Errors from [`EmailChannelSender::send`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(ValidationError),

    #[error("invalid content: {0}")]
    InvalidContent(ValidationError),

    /// Breaker is open. Not a failure of this message.
    #[error("mail channel temporarily unavailable, retry after {retry_after:?}")]
    TemporarilyUnavailable { retry_after: Duration },

    #[error("message rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error(transparent)]
    Transport(TransportError),
}

impl SendError {
    /// True if sending the same message later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SendError::TemporarilyUnavailable { .. } | SendError::Transport(_)
        )
    }
}

/// Sender identity and link base for outbound mail.
#[derive(Debug, Clone)]
pub struct EmailSenderConfig {
    pub from_email: String,
    pub from_name: String,
    pub app_url: String,
}

impl Default for EmailSenderConfig {
    fn default() -> Self {
        Self {
            from_email: "notifications@localhost".to_string(),
            from_name: "Notifications".to_string(),
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Reports a failure to the breaker unless the attempt was settled first.
struct PendingAttempt<'a> {
    breaker: &'a dyn CircuitBreaker,
    settled: bool,
}

impl<'a> PendingAttempt<'a> {
    fn start(breaker: &'a dyn CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn succeeded(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failed(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Mail send abandoned before the relay answered");
            self.breaker.record_failure();
        }
    }
}

pub struct EmailChannelSender {
    transport: Arc<dyn MailTransport>,
    breaker: Arc<dyn CircuitBreaker>,
    config: EmailSenderConfig,
}

impl EmailChannelSender {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        breaker: Arc<dyn CircuitBreaker>,
        config: EmailSenderConfig,
    ) -> Self {
        Self {
            transport,
            breaker,
            config,
        }
    }

    pub fn breaker(&self) -> &Arc<dyn CircuitBreaker> {
        &self.breaker
    }

    pub async fn send(&self, job: &DeliveryJob) -> Result<TransportReceipt, SendError> {
        let to = EmailAddress::parse(&job.recipient.address).map_err(SendError::InvalidRecipient)?;
        job.validate().map_err(SendError::InvalidContent)?;

        if !self.breaker.should_allow() {
            let retry_after = self.breaker.retry_after().unwrap_or_default();
            tracing::debug!(
                job_id = %job.idempotency_key,
                retry_after_ms = retry_after.as_millis() as u64,
                "Mail circuit open, send skipped"
            );
            return Err(SendError::TemporarilyUnavailable { retry_after });
        }

        let rendered = templates::render(
            &job.content,
            job.recipient.display_name.as_deref(),
            &self.config.app_url,
        );
        let email = OutboundEmail {
            to,
            to_name: job.recipient.display_name.clone(),
            from: self.config.from_email.clone(),
            from_name: self.config.from_name.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            idempotency_key: Some(job.idempotency_key.as_str().to_string()),
        };

        let attempt = PendingAttempt::start(self.breaker.as_ref());
        match self.transport.send(&email).await {
            Ok(receipt) => {
                attempt.succeeded();
                tracing::info!(
                    job_id = %job.idempotency_key,
                    user_id = %job.recipient.user_id,
                    "Notification email sent"
                );
                Ok(receipt)
            }
            Err(TransportError::Rejected { status, body }) => {
                // The service answered; only this message is bad.
                attempt.succeeded();
                tracing::warn!(
                    job_id = %job.idempotency_key,
                    status,
                    "Notification email rejected"
                );
                Err(SendError::Rejected { status, body })
            }
            Err(e) => {
                attempt.failed();
                tracing::warn!(
                    job_id = %job.idempotency_key,
                    error = %e,
                    "Notification email send failed"
                );
                Err(SendError::Transport(e))
            }
        }
    }
}
