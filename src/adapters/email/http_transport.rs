//! HTTP mail transport.
//!
//! Posts rendered messages as JSON to a mail relay API using a pooled,
//! authenticated `reqwest` client.
//!
//! # Configuration
//!
//! ```ignore
//! let config = HttpMailTransportConfig::new("smtp.example.com", 443, "user", secret)
//!     .with_pool_size(5)
//!     .with_timeout(Duration::from_secs(10));
//! let transport = HttpMailTransport::new(config)?;
//! ```
//!
//! # Status mapping
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | `Ok(TransportReceipt)` |
//! | 429, 5xx | `TransportError::Unavailable` |
//! | other 4xx | `TransportError::Rejected` |
//! | timeout | `TransportError::Timeout` |
//! | connect error | `TransportError::Unavailable` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::ports::{MailTransport, OutboundEmail, TransportError, TransportReceipt};

/// Connection settings for [`HttpMailTransport`].
#[derive(Debug, Clone)]
pub struct HttpMailTransportConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: SecretString,
    /// Use `https`.
    pub secure: bool,
    /// Verify the server certificate. Only disable in development.
    pub verify_tls: bool,
    /// Maximum idle pooled connections.
    pub pool_size: usize,
    /// Path of the send endpoint.
    pub api_path: String,
    pub timeout: Duration,
}

impl HttpMailTransportConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
            secure: true,
            verify_tls: true,
            pool_size: 5,
            api_path: "/v1/send".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let path = if self.api_path.starts_with('/') {
            self.api_path.clone()
        } else {
            format!("/{}", self.api_path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }
}

#[derive(Debug, Serialize)]
struct MailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: MailAddress<'a>,
    to: Vec<MailAddress<'a>>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default, alias = "messageId")]
    id: Option<String>,
}

/// Mail transport over an HTTP relay API.
pub struct HttpMailTransport {
    config: HttpMailTransportConfig,
    endpoint: String,
    client: Client,
}

impl HttpMailTransport {
    pub fn new(config: HttpMailTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_size)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| TransportError::Unavailable(format!("client setup failed: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint(),
            config,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(status: StatusCode, body: String) -> TransportError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            TransportError::Unavailable(format!("status {}: {}", status.as_u16(), body))
        } else {
            TransportError::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError> {
        let request = SendRequest {
            from: MailAddress {
                email: &email.from,
                name: Some(&email.from_name),
            },
            to: vec![MailAddress {
                email: email.to.as_str(),
                name: email.to_name.as_deref(),
            }],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .json(&request);
        if let Some(key) = &email.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() {
                TransportError::Unavailable(format!("connection failed: {}", e))
            } else {
                TransportError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "Mail relay refused message");
            return Err(Self::classify(status, body));
        }

        let message_id = response
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|r| r.id);
        tracing::debug!(to_domain = %email.to.domain(), ?message_id, "Mail relay accepted message");

        Ok(TransportReceipt { message_id })
    }
}
