//! Email configuration

use serde::Deserialize;
use secrecy::SecretString;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::email::{EmailSenderConfig, HttpMailTransportConfig};

pub const MAX_POOL_SIZE: usize = 100;

/// Outbound mail service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Mail API host
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Credential pair; both halves are required
    pub username: Option<String>,
    pub password: Option<SecretString>,

    /// Pooled idle connections to the mail host
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Use https
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Verify the server certificate (disable only in development)
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// From email address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// From name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl EmailConfig {
    /// Get formatted "From" header value
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Transport settings. Call only after [`validate`](Self::validate) passed.
    pub fn transport_config(&self) -> Result<HttpMailTransportConfig, ValidationError> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ValidationError::MissingRequired("EMAIL__USERNAME"))?;
        let password = self
            .password
            .clone()
            .ok_or(ValidationError::MissingRequired("EMAIL__PASSWORD"))?;

        Ok(
            HttpMailTransportConfig::new(self.host.trim(), self.port, username, password)
                .with_secure(self.secure)
                .with_verify_tls(self.verify_tls)
                .with_pool_size(self.pool_size)
                .with_api_path(self.api_path.clone())
                .with_timeout(self.timeout()),
        )
    }

    pub fn sender_config(&self, app_url: &str) -> EmailSenderConfig {
        EmailSenderConfig {
            from_email: self.from_email.clone(),
            from_name: self.from_name.clone(),
            app_url: app_url.to_string(),
        }
    }

    /// Validate email configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        use secrecy::ExposeSecret;

        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingRequired("EMAIL__HOST"));
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort("email"));
        }
        if self.username.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(ValidationError::MissingRequired("EMAIL__USERNAME"));
        }
        if self
            .password
            .as_ref()
            .map_or(true, |p| p.expose_secret().is_empty())
        {
            return Err(ValidationError::MissingRequired("EMAIL__PASSWORD"));
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ValidationError::InvalidPoolSize {
                max: MAX_POOL_SIZE,
                actual: self.pool_size,
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("email"));
        }
        if !self.from_email.contains('@') {
            return Err(ValidationError::InvalidFromEmail);
        }
        Ok(())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            pool_size: default_pool_size(),
            secure: true,
            verify_tls: true,
            api_path: default_api_path(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_port() -> u16 {
    443
}

fn default_pool_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_api_path() -> String {
    "/v1/send".to_string()
}

fn default_from_email() -> String {
    "notifications@localhost".to_string()
}

fn default_from_name() -> String {
    "Notifications".to_string()
}

fn default_timeout() -> u64 {
    10
}
