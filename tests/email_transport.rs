//! Integration tests for the HTTP mail transport against a stub relay.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_hub::adapters::email::{
    EmailChannelSender, EmailSenderConfig, HttpMailTransport, HttpMailTransportConfig,
    InMemoryCircuitBreaker, SendError,
};
use notification_hub::domain::foundation::{JobId, UserId};
use notification_hub::domain::notification::{
    ChannelType, DeliveryJob, DeliveryRecipient, EmailAddress, NotificationContent,
    NotificationKind, Priority,
};
use notification_hub::ports::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, MailTransport, OutboundEmail,
    TransportError,
};

fn transport_for(server: &MockServer, timeout: Duration) -> HttpMailTransport {
    let config = HttpMailTransportConfig::new(
        "127.0.0.1",
        server.address().port(),
        "hub",
        SecretString::new("secret".to_string()),
    )
    .with_secure(false)
    .with_timeout(timeout);
    HttpMailTransport::new(config).unwrap()
}

fn email(key: &str) -> OutboundEmail {
    OutboundEmail {
        to: EmailAddress::parse("bob@example.com").unwrap(),
        to_name: Some("Bob".into()),
        from: "notifications@example.com".into(),
        from_name: "Tasks".into(),
        subject: "You were assigned".into(),
        html: "<p>Ship</p>".into(),
        text: "Ship".into(),
        idempotency_key: Some(key.to_string()),
    }
}

fn job(key: &str) -> DeliveryJob {
    DeliveryJob {
        idempotency_key: JobId::new(key).unwrap(),
        recipient: DeliveryRecipient {
            user_id: UserId::new("bob").unwrap(),
            address: "bob@example.com".into(),
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
            message: "Join Acme".into(),
            actor_name: Some("Alice".into()),
            link: None,
        },
        priority: Priority::Normal,
    }
}

#[tokio::test]
async fn accepted_message_returns_provider_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("Idempotency-Key", "n-1"))
        .and(header("authorization", "Basic aHViOnNlY3JldA=="))
        .and(body_partial_json(json!({
            "subject": "You were assigned",
            "from": { "email": "notifications@example.com", "name": "Tasks" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = transport_for(&server, Duration::from_secs(2))
        .send(&email("n-1"))
        .await
        .unwrap();

    assert_eq!(receipt.message_id.as_deref(), Some("msg-42"));
}

#[tokio::test]
async fn server_errors_are_transient_and_client_errors_are_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("Idempotency-Key", "busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("Idempotency-Key", "bad"))
        .respond_with(ResponseTemplate::new(422).set_body_string("mailbox unknown"))
        .mount(&server)
        .await;

    let transport = transport_for(&server, Duration::from_secs(2));

    let busy = transport.send(&email("busy")).await.unwrap_err();
    assert!(matches!(busy, TransportError::Unavailable(_)));
    assert!(busy.is_transient());

    let bad = transport.send(&email("bad")).await.unwrap_err();
    match bad {
        TransportError::Rejected { status, body } => {
            assert_eq!(status, 422);
            assert_eq!(body, "mailbox unknown");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_relay_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let err = transport_for(&server, Duration::from_millis(50))
        .send(&email("slow"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Timeout));
}

#[tokio::test]
async fn breaker_opens_after_repeated_relay_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let breaker = Arc::new(InMemoryCircuitBreaker::new(CircuitBreakerConfig::new(
        3,
        Duration::from_secs(60),
    )));
    let sender = EmailChannelSender::new(
        Arc::new(transport_for(&server, Duration::from_secs(2))),
        breaker.clone(),
        EmailSenderConfig::default(),
    );

    for _ in 0..3 {
        let err = sender.send(&job("n-9")).await.unwrap_err();
        assert!(err.is_retryable());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // The relay is not contacted again while the circuit is open.
    let err = sender.send(&job("n-9")).await.unwrap_err();
    assert!(matches!(err, SendError::TemporarilyUnavailable { .. }));
}
