//! Append a connectivity-check row to the configured sheet to verify credentials and sheet access.
//! Uses the same environment as the server (.env supported), including `ALLOWED_ORIGINS` or `LEADSHEET_DEV`.

use anyhow::{Context, Result};
use chrono::Utc;
use dotenvy::dotenv;
use leadsheet::config::Config;
use leadsheet::models::{ClientIdentity, SubmissionRecord, SubmissionRequest};
use leadsheet::sheets::{GoogleSheetsClient, SheetsApi};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present for local runs.
    dotenv().ok();

    let config = Config::from_env().context("Missing sheet configuration in environment")?;
    let client = GoogleSheetsClient::from_config(&config)?;

    let check = SubmissionRequest {
        name: "Connectivity check".to_string(),
        email: "connectivity@example.com".to_string(),
        company: String::new(),
        message: "Row written by sheet_append; safe to delete.".to_string(),
        website: String::new(),
    };
    let record = SubmissionRecord::new(&check, &ClientIdentity::new("sheet_append"), Utc::now());

    client
        .append_row(&record)
        .await
        .context("Failed to append connectivity-check row")?;

    println!("Appended connectivity-check row to {}", client.range());
    Ok(())
}
