use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::credentials::{self, ServiceAccountKey};
use crate::error::ContactError;
use crate::models::SubmissionRecord;

pub const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn append_row(&self, record: &SubmissionRecord) -> Result<(), ContactError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInputOption {
    Raw,
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInputOption::Raw => "RAW",
            ValueInputOption::UserEntered => "USER_ENTERED",
        }
    }
}

impl FromStr for ValueInputOption {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RAW" => Ok(ValueInputOption::Raw),
            "USER_ENTERED" => Ok(ValueInputOption::UserEntered),
            other => Err(anyhow::anyhow!(
                "Unsupported value input option '{}' (expected RAW or USER_ENTERED)",
                other
            )),
        }
    }
}

/// Appends rows to `<sheet>!A:F` of one spreadsheet, authenticating as a service account.
///
/// Every append mints a fresh access token. Submission volume is low enough that
/// token caching is not worth the extra state.
pub struct GoogleSheetsClient {
    client: Client,
    encoded_key: String,
    credentials: OnceCell<ServiceAccountKey>,
    spreadsheet_id: String,
    sheet_name: String,
    value_input: ValueInputOption,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GoogleSheetsClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let user_agent = format!("leadsheet/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .context("Failed to build Sheets HTTP client")?;
        Ok(Self {
            client,
            encoded_key: config.service_account_key_b64.clone(),
            credentials: OnceCell::new(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            value_input: config.value_input,
        })
    }

    pub fn range(&self) -> String {
        format!("{}!A:F", self.sheet_name)
    }

    fn credentials(&self) -> Result<&ServiceAccountKey, ContactError> {
        self.credentials
            .get_or_try_init(|| credentials::load(Some(&self.encoded_key)))
    }

    async fn access_token(&self, key: &ServiceAccountKey) -> Result<String, ContactError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ContactError::Auth(format!("private key is not a usable RSA PEM: {}", e)))?;

        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let assertion = jsonwebtoken::encode(&header, &claims, &signing_key)
            .map_err(|e| ContactError::Auth(format!("failed to sign token assertion: {}", e)))?;

        let res = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ContactError::ExternalService(format!("token request failed: {}", e)))?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| ContactError::ExternalService(format!("failed to read token response: {}", e)))?;
        if !status.is_success() {
            return Err(ContactError::Auth(format!(
                "identity provider rejected {} (status {}): {}",
                key.client_email,
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ContactError::Auth(format!("unexpected token response: {}", e)))?;
        debug!("Obtained access token for {}", key.client_email);
        Ok(token.access_token)
    }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn append_row(&self, record: &SubmissionRecord) -> Result<(), ContactError> {
        let key = self.credentials()?;
        let token = self.access_token(key).await?;

        let range = self.range();
        let url = format!(
            "{SHEETS_BASE}/{}/values/{}:append",
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&range)
        );
        let body = json!({ "values": [record.to_row()] });

        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[
                ("valueInputOption", self.value_input.as_str()),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&body)
            .send()
            .await
            .map_err(|e| ContactError::ExternalService(format!("append request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(ContactError::ExternalService(format!(
                "append to {} failed (status {}): {}",
                range, status, detail
            )));
        }

        info!("Appended submission row to {}", range);
        Ok(())
    }
}
