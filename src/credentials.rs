use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;
use std::fmt;

use crate::error::ContactError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

// Keys pasted into hosting dashboards often lose their padding.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Decodes a base64 service-account document into signing material.
///
/// Escaped `\n` sequences in the private key are turned into real line breaks.
pub fn load(encoded: Option<&str>) -> Result<ServiceAccountKey, ContactError> {
    let encoded = encoded
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ContactError::Configuration("service account key is not set".to_string()))?;

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let raw = LENIENT_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ContactError::Configuration(format!("service account key is not valid base64: {}", e)))?;

    // serde_json's message may quote input; keep only the position.
    let mut key: ServiceAccountKey = serde_json::from_slice(&raw).map_err(|e| {
        ContactError::Configuration(format!(
            "service account key is not a valid credential document (line {}, column {})",
            e.line(),
            e.column()
        ))
    })?;

    if key.client_email.trim().is_empty() {
        return Err(ContactError::Configuration(
            "service account key has an empty client_email".to_string(),
        ));
    }
    if key.private_key.trim().is_empty() {
        return Err(ContactError::Configuration(
            "service account key has an empty private_key".to_string(),
        ));
    }

    key.private_key = key.private_key.replace("\\n", "\n");
    Ok(key)
}
