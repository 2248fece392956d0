//! Email address value object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;

/// A syntactically valid email address.
///
/// Deliberately conservative: exactly one `@`, a non-empty local part of at
/// most 64 characters, and a dotted domain whose labels are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(ValidationError::empty_field("email"));
        }
        if raw.len() > MAX_ADDRESS_LEN {
            return Err(ValidationError::out_of_range(
                "email",
                1,
                MAX_ADDRESS_LEN as i64,
                raw.len() as i64,
            ));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::invalid_format(
                "email",
                "contains whitespace or control characters",
            ));
        }

        let mut parts = raw.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => {
                return Err(ValidationError::invalid_format(
                    "email",
                    "must contain exactly one @",
                ))
            }
        };

        if local.is_empty() || local.len() > MAX_LOCAL_LEN {
            return Err(ValidationError::invalid_format(
                "email",
                "local part must be 1-64 characters",
            ));
        }
        if !domain.contains('.') || domain.split('.').any(|label| label.is_empty()) {
            return Err(ValidationError::invalid_format(
                "email",
                "domain must be dotted",
            ));
        }
        if raw.contains(['<', '>', '"', ',', ';']) {
            return Err(ValidationError::invalid_format(
                "email",
                "contains forbidden characters",
            ));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after `@`.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, d)| d).unwrap_or("")
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.0
    }
}
