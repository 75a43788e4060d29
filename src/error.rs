//! Failure taxonomy of the contact pipeline and its response mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::{ContactResponse, FieldViolation};

pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const SERVER_ERROR_MESSAGE: &str = "Server error";

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("too many requests")]
    RateLimited,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("external service error: {0}")]
    ExternalService(String),
}

impl ContactError {
    pub fn status(&self) -> StatusCode {
        match self {
            ContactError::Validation(_) => StatusCode::BAD_REQUEST,
            ContactError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ContactError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ContactError::Configuration(_)
            | ContactError::Auth(_)
            | ContactError::ExternalService(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body returned to the caller. Server-side detail stays in the logs.
    pub fn body(&self) -> ContactResponse {
        match self {
            ContactError::Validation(violations) => ContactResponse {
                ok: false,
                message: join_violations(violations),
                errors: violations.clone(),
            },
            ContactError::RateLimited => ContactResponse::failure("Too many requests"),
            ContactError::MethodNotAllowed => ContactResponse::failure("Method not allowed"),
            ContactError::Configuration(_)
            | ContactError::Auth(_)
            | ContactError::ExternalService(_) => ContactResponse::failure(SERVER_ERROR_MESSAGE),
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for ContactError {
    fn into_response(self) -> Response {
        let mut res = (self.status(), Json(self.body())).into_response();
        if matches!(self, ContactError::MethodNotAllowed) {
            res.headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        res
    }
}
