//! Handles a single contact submission read from stdin and prints the response.
//!
//! Usage: `contact_oneshot [--client <ip>] < submission.json`
//! Needs the same environment as the server, including `ALLOWED_ORIGINS` or `LEADSHEET_DEV`.
//! Exits non-zero when the response status is not 2xx.

use anyhow::{Context, Result};
use axum::http::Method;
use dotenvy::dotenv;
use leadsheet::config::Config;
use leadsheet::models::ClientIdentity;
use leadsheet::pipeline::ContactPipeline;
use leadsheet::rate_limit::FixedWindowLimiter;
use leadsheet::sheets::GoogleSheetsClient;
use serde_json::json;
use std::env;
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn parse_client<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--client" {
            return args.next().filter(|v| !v.starts_with("--"));
        }
        if let Some(value) = arg.strip_prefix("--client=") {
            return Some(value.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let config = Config::from_env()?;
    let sheets = Arc::new(GoogleSheetsClient::from_config(&config)?);
    let pipeline = ContactPipeline::new(
        sheets,
        Arc::new(FixedWindowLimiter::default()),
        config.persist_timeout,
    );

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .context("Failed to read submission from stdin")?;

    let client = ClientIdentity::resolve(parse_client(env::args().skip(1)).as_deref(), None);
    let (status, response) = match pipeline.dispatch(&Method::POST, &client, &body).await {
        Ok(outcome) => (outcome.status(), serde_json::to_value(outcome.body())?),
        Err(err) => (err.status(), serde_json::to_value(err.body())?),
    };

    println!(
        "{}",
        json!({ "status": status.as_u16(), "body": response })
    );

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
