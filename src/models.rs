use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::IpAddr;
use validator::Validate;

use crate::validate::non_blank;

/// Replaces line breaks in a message so the stored row stays a single flat line.
pub const NEWLINE_SEPARATOR: &str = " ↵ ";

/// Submission as received from the contact form, before validation.
#[derive(Debug, Deserialize, Validate, Default, Clone)]
pub struct ContactForm {
    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(custom(function = "non_blank", message = "Name is required"))]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[serde(default)]
    pub company: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,

    // Hidden from real users; bots fill it in.
    #[serde(default)]
    pub website: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A submission that passed validation. Optional fields are normalized to empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub name: String,
    pub email: String,
    pub company: String,
    pub message: String,
    pub website: String,
}

impl SubmissionRequest {
    pub fn is_automated(&self) -> bool {
        !self.website.is_empty()
    }
}

/// Rate-limit key for one caller. Never persisted beyond the appended row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// First hop of a forwarded-for chain, then the transport peer, then `unknown`.
    pub fn resolve(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> Self {
        let first_hop = forwarded_for
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        match (first_hop, peer) {
            (Some(hop), _) => Self(hop.to_string()),
            (None, Some(ip)) => Self(ip.to_string()),
            (None, None) => Self(Self::UNKNOWN.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row appended to the sheet, columns A through F.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub timestamp: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub message: String,
    pub client: String,
}

impl SubmissionRecord {
    pub fn new(submission: &SubmissionRequest, client: &ClientIdentity, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            name: submission.name.clone(),
            email: submission.email.clone(),
            company: submission.company.clone(),
            message: flatten_message(&submission.message),
            client: client.as_str().to_string(),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.name.clone(),
            self.email.clone(),
            self.company.clone(),
            self.message.clone(),
            self.client.clone(),
        ]
    }
}

pub fn flatten_message(message: &str) -> String {
    message
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', NEWLINE_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactResponse {
    pub ok: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldViolation>,
}

impl ContactResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jane() -> SubmissionRequest {
        SubmissionRequest {
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            company: String::new(),
            message: "Hi\nthere".to_string(),
            website: String::new(),
        }
    }

    #[test]
    fn client_identity_prefers_first_forwarded_hop() {
        let peer: IpAddr = "10.0.0.7".parse().unwrap();
        let id = ClientIdentity::resolve(Some("203.0.113.9, 10.0.0.1"), Some(peer));
        assert_eq!(id.as_str(), "203.0.113.9");
        let id = ClientIdentity::resolve(Some("  "), Some(peer));
        assert_eq!(id.as_str(), "10.0.0.7");
        let id = ClientIdentity::resolve(None, None);
        assert_eq!(id.as_str(), "unknown");
    }

    #[test]
    fn record_flattens_message_newlines() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let record = SubmissionRecord::new(&jane(), &ClientIdentity::new("1.2.3.4"), at);
        assert_eq!(record.message, "Hi ↵ there");
        assert!(!record.message.contains('\n'));
        assert_eq!(record.timestamp, "2024-05-01T12:30:00.000Z");
        assert_eq!(
            record.to_row(),
            vec!["2024-05-01T12:30:00.000Z", "Jane", "jane@x.com", "", "Hi ↵ there", "1.2.3.4"]
        );
    }

    #[test]
    fn flattens_carriage_returns_too() {
        assert_eq!(flatten_message("a\r\nb\rc"), "a ↵ b ↵ c");
        assert_eq!(flatten_message("single line"), "single line");
    }

    #[test]
    fn missing_and_null_fields_deserialize_as_empty() {
        let form: ContactForm =
            serde_json::from_str(r#"{"name": null, "company": null}"#).unwrap();
        assert_eq!(form.name, "");
        assert_eq!(form.email, "");
        assert_eq!(form.message, "");
        assert!(form.company.is_none());
        assert!(form.website.is_none());
    }
}
