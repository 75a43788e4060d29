use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::env;
use std::time::Duration;

use crate::sheets::ValueInputOption;

pub const REQUIRED_ENV: [&str; 2] = ["GOOGLE_SERVICE_ACCOUNT_KEY_BASE64", "SPREADSHEET_ID"];
const DEFAULT_SHEET_NAME: &str = "Sheet1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_PERSIST_TIMEOUT_SECS: u64 = 8;
const DEV_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

impl AllowedOrigins {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim() == "*" {
            return Ok(AllowedOrigins::Any);
        }
        let origins = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid origin in ALLOWED_ORIGINS: {}", o))
            })
            .collect::<Result<Vec<_>>>()?;
        if origins.is_empty() {
            anyhow::bail!("ALLOWED_ORIGINS must list at least one origin or be '*'");
        }
        Ok(AllowedOrigins::List(origins))
    }

    /// Local dev origins apply only when `dev` is set; otherwise the list must be explicit.
    pub fn resolve(raw: Option<&str>, dev: bool) -> Result<Self> {
        match (raw, dev) {
            (Some(raw), _) => Self::parse(raw),
            (None, true) => Self::parse(DEV_ALLOWED_ORIGINS),
            (None, false) => anyhow::bail!(
                "ALLOWED_ORIGINS must be set to the site's origins (or '*'); set LEADSHEET_DEV=1 to allow localhost only"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service_account_key_b64: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub value_input: ValueInputOption,
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub persist_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let service_account_key_b64 = required("GOOGLE_SERVICE_ACCOUNT_KEY_BASE64")?;
        let spreadsheet_id = required("SPREADSHEET_ID")?;
        let sheet_name = optional("SHEET_NAME").unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());

        let value_input = match optional("SHEETS_VALUE_INPUT") {
            Some(v) => v.parse().context("Invalid SHEETS_VALUE_INPUT")?,
            None => ValueInputOption::Raw,
        };

        let port = match optional("PORT") {
            Some(v) => v.parse().with_context(|| format!("Invalid PORT: {}", v))?,
            None => DEFAULT_PORT,
        };

        let allowed_origins = AllowedOrigins::resolve(
            optional("ALLOWED_ORIGINS").as_deref(),
            is_dev(optional("LEADSHEET_DEV")),
        )?;

        let persist_timeout = match optional("PERSIST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .with_context(|| format!("Invalid PERSIST_TIMEOUT_SECS: {}", v))?,
            ),
            None => Duration::from_secs(DEFAULT_PERSIST_TIMEOUT_SECS),
        };

        Ok(Self {
            service_account_key_b64,
            spreadsheet_id,
            sheet_name,
            value_input,
            port,
            allowed_origins,
            persist_timeout,
        })
    }
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| anyhow::anyhow!("{} must be set", key))
}

fn is_dev(flag: Option<String>) -> bool {
    matches!(
        flag.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes")
    )
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_list_and_wildcard() {
        assert!(matches!(AllowedOrigins::parse("*").unwrap(), AllowedOrigins::Any));
        match AllowedOrigins::parse("https://a.example, https://b.example,").unwrap() {
            AllowedOrigins::List(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[1], "https://b.example");
            }
            AllowedOrigins::Any => panic!("expected a list"),
        }
        assert!(AllowedOrigins::parse(" , ").is_err());
    }

    #[test]
    fn origins_must_be_explicit_outside_dev() {
        assert!(AllowedOrigins::resolve(None, false).is_err());
        match AllowedOrigins::resolve(None, true).unwrap() {
            AllowedOrigins::List(list) => {
                assert_eq!(list, vec!["http://localhost:5173", "http://localhost:3000"]);
            }
            AllowedOrigins::Any => panic!("expected localhost origins"),
        }
        assert!(matches!(
            AllowedOrigins::resolve(Some("https://studio.example"), false).unwrap(),
            AllowedOrigins::List(_)
        ));
    }

    #[test]
    fn dev_flag_accepts_common_truthy_values() {
        assert!(is_dev(Some("1".to_string())));
        assert!(is_dev(Some("TRUE".to_string())));
        assert!(!is_dev(Some("0".to_string())));
        assert!(!is_dev(None));
    }
}
