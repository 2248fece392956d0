//! Delivery handler that sends jobs through the email channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::sender::{EmailChannelSender, SendError};
use crate::domain::notification::JobRecord;
use crate::ports::{DeliveryHandler, DeliveryOutcome};

/// Floor for deferrals, so a cooldown ending right now does not spin.
const MIN_DEFER_DELAY: Duration = Duration::from_millis(10);

pub struct EmailDeliveryHandler {
    sender: Arc<EmailChannelSender>,
}

impl EmailDeliveryHandler {
    pub fn new(sender: Arc<EmailChannelSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl DeliveryHandler for EmailDeliveryHandler {
    async fn handle(&self, record: &JobRecord) -> DeliveryOutcome {
        match self.sender.send(&record.job).await {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(e @ SendError::InvalidRecipient(_))
            | Err(e @ SendError::InvalidContent(_))
            | Err(e @ SendError::Rejected { .. }) => DeliveryOutcome::Reject(e.to_string()),
            Err(SendError::TemporarilyUnavailable { retry_after }) => DeliveryOutcome::Defer {
                reason: SendError::TemporarilyUnavailable { retry_after }.to_string(),
                retry_after: retry_after.max(MIN_DEFER_DELAY),
            },
            Err(e) => DeliveryOutcome::Retry(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::email::{EmailSenderConfig, InMemoryCircuitBreaker, MockMailTransport};
    use crate::domain::foundation::{JobId, UserId};
    use crate::domain::notification::{
        ChannelType, DeliveryJob, DeliveryRecipient, NotificationContent, NotificationKind,
        Priority,
    };
    use crate::ports::{CircuitBreakerConfig, TransportError};

    fn record(address: &str) -> JobRecord {
        JobRecord::new(
            DeliveryJob {
                idempotency_key: JobId::new("n-1").unwrap(),
                recipient: DeliveryRecipient {
                    user_id: UserId::new("bob").unwrap(),
                    address: address.into(),
                    display_name: None,
                },
                channel: ChannelType::Email,
                content: NotificationContent {
                    kind: NotificationKind::WorkspaceInvitation {
                        workspace_id: "w1".into(),
                        workspace_name: "Acme".into(),
                        role: "member".into(),
                    },
                    title: "Invitation".into(),
                    message: String::new(),
                    actor_name: None,
                    link: None,
                },
                priority: Priority::Normal,
            },
            0,
        )
    }

    fn handler() -> (EmailDeliveryHandler, Arc<MockMailTransport>) {
        let transport = Arc::new(MockMailTransport::new());
        let sender = EmailChannelSender::new(
            transport.clone(),
            Arc::new(InMemoryCircuitBreaker::default()),
            EmailSenderConfig::default(),
        );
        (EmailDeliveryHandler::new(Arc::new(sender)), transport)
    }

    #[tokio::test]
    async fn maps_outcomes() {
        let (handler, transport) = handler();
        assert_eq!(
            handler.handle(&record("bob@example.com")).await,
            DeliveryOutcome::Delivered
        );

        transport.push_outcome(Err(TransportError::Timeout));
        assert!(matches!(
            handler.handle(&record("bob@example.com")).await,
            DeliveryOutcome::Retry(_)
        ));

        transport.push_outcome(Err(TransportError::Rejected {
            status: 400,
            body: "bad".into(),
        }));
        assert!(matches!(
            handler.handle(&record("bob@example.com")).await,
            DeliveryOutcome::Reject(_)
        ));

        assert!(matches!(
            handler.handle(&record("not an address")).await,
            DeliveryOutcome::Reject(_)
        ));
    }

    #[tokio::test]
    async fn open_circuit_defers_instead_of_retrying() {
        let transport = Arc::new(MockMailTransport::new());
        let breaker = Arc::new(InMemoryCircuitBreaker::new(CircuitBreakerConfig::new(
            1,
            Duration::from_secs(30),
        )));
        let sender = EmailChannelSender::new(
            transport.clone(),
            breaker,
            EmailSenderConfig::default(),
        );
        let handler = EmailDeliveryHandler::new(Arc::new(sender));

        transport.push_outcome(Err(TransportError::Unavailable("503".into())));
        assert!(matches!(
            handler.handle(&record("bob@example.com")).await,
            DeliveryOutcome::Retry(_)
        ));

        match handler.handle(&record("bob@example.com")).await {
            DeliveryOutcome::Defer {
                reason,
                retry_after,
            } => {
                assert!(reason.contains("temporarily unavailable"));
                assert!(retry_after > Duration::from_secs(29));
                assert!(retry_after <= Duration::from_secs(30));
            }
            other => panic!("expected Defer, got {:?}", other),
        }
        assert_eq!(transport.call_count(), 1);
    }
}
