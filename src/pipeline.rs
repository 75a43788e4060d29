//! Hosting-independent contact submission handler.
//!
//! Adapters translate their transport into a method, a client identity and a raw body,
//! call [`ContactPipeline::dispatch`], and render the returned outcome or error.

use axum::http::{Method, StatusCode};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::ContactError;
use crate::models::{ClientIdentity, ContactResponse, SubmissionRecord};
use crate::rate_limit::RateLimit;
use crate::sheets::SheetsApi;
use crate::validate::{parse_form, validate};

pub const SUBMITTED_MESSAGE: &str = "Submitted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pre-flight request; answered with an empty body.
    Preflight,
    /// Read-only liveness check of the endpoint.
    Alive,
    /// Row appended.
    Submitted,
    /// Honeypot tripped. Rendered exactly like `Submitted`.
    Discarded,
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        StatusCode::OK
    }

    pub fn body(&self) -> Option<ContactResponse> {
        match self {
            Outcome::Preflight | Outcome::Alive => None,
            Outcome::Submitted | Outcome::Discarded => {
                Some(ContactResponse::success(SUBMITTED_MESSAGE))
            }
        }
    }
}

#[derive(Clone)]
pub struct ContactPipeline {
    sheets: Arc<dyn SheetsApi>,
    limiter: Arc<dyn RateLimit>,
    persist_timeout: Duration,
}

impl ContactPipeline {
    pub fn new(
        sheets: Arc<dyn SheetsApi>,
        limiter: Arc<dyn RateLimit>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            sheets,
            limiter,
            persist_timeout,
        }
    }

    pub async fn dispatch(
        &self,
        method: &Method,
        client: &ClientIdentity,
        body: &[u8],
    ) -> Result<Outcome, ContactError> {
        if method == Method::OPTIONS {
            return Ok(Outcome::Preflight);
        }
        if method == Method::GET || method == Method::HEAD {
            return Ok(Outcome::Alive);
        }
        if method != Method::POST {
            return Err(ContactError::MethodNotAllowed);
        }

        if !self.limiter.check(client) {
            warn!("Rate limit exceeded for {}", client);
            return Err(ContactError::RateLimited);
        }

        let submission = validate(parse_form(body)?)?;

        if submission.is_automated() {
            info!("Honeypot field set; discarding submission from {}", client);
            return Ok(Outcome::Discarded);
        }

        let record = SubmissionRecord::new(&submission, client, Utc::now());
        self.persist(record).await?;
        Ok(Outcome::Submitted)
    }

    async fn persist(&self, record: SubmissionRecord) -> Result<(), ContactError> {
        let sheets = self.sheets.clone();
        // Own task: if the caller goes away, the append still runs to completion.
        let task = tokio::spawn(async move { sheets.append_row(&record).await });

        let result = match tokio::time::timeout(self.persist_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ContactError::ExternalService(format!(
                "append task failed: {}",
                join_err
            ))),
            Err(_) => Err(ContactError::ExternalService(format!(
                "append did not finish within {:?}",
                self.persist_timeout
            ))),
        };

        if let Err(e) = &result {
            error!("Failed to record submission: {}", e);
        }
        result
    }
}
