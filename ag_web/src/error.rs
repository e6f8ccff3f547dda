//! ABOUTME: Error handling for the Control API's `{code, msg}` envelope
//! ABOUTME: Converts validation errors and domain errors into that shape

use crate::models::{CODE_INTERNAL, CODE_NOT_FOUND, CODE_VALIDATION};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// API error wrapper: a domain `code` plus `msg`, with an HTTP status that
/// is 200 for ordinary domain failures and only non-200 for transport-level
/// conditions (e.g. looking up a control that doesn't exist).
#[derive(Debug)]
pub struct ApiError {
    pub code: i32,
    pub msg: String,
    pub http_status: u16,
}

impl ApiError {
    pub fn new(code: i32, msg: impl Into<String>, http_status: u16) -> Self {
        Self {
            code,
            msg: msg.into(),
            http_status,
        }
    }

    pub fn validation(errors: ValidationErrors) -> Self {
        let detail = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages: Vec<String> = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("invalid value for '{field}'"))
                    })
                    .collect();
                format!("{field}: {}", messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::new(CODE_VALIDATION, detail, 200)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(CODE_VALIDATION, detail, 200)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(CODE_NOT_FOUND, detail, 404)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL, detail, 500)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.msg)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "code": self.code,
            "msg": self.msg,
        }))
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

/// Convert a domain error into the API envelope. `NotFound`/`Validation`
/// surface their own message; everything else is reported as an opaque
/// internal error with the detail only in the server log.
impl From<ag_core::Error> for ApiError {
    fn from(error: ag_core::Error) -> Self {
        match error {
            ag_core::Error::NotFound(msg) => Self::not_found(msg),
            ag_core::Error::Validation(msg) => Self::bad_request(msg),
            ag_core::Error::Database(msg) => {
                tracing::error!(error = %msg, "database error");
                Self::internal("database error")
            }
            ag_core::Error::Config(msg) => {
                tracing::error!(error = %msg, "configuration error");
                Self::internal("configuration error")
            }
            ag_core::Error::External(msg) => {
                tracing::error!(error = %msg, "external service error");
                Self::internal("external service error")
            }
            ag_core::Error::Io(e) => {
                tracing::error!(error = %e, "io error");
                Self::internal("io error")
            }
            ag_core::Error::Storage(msg) => {
                tracing::error!(error = %msg, "storage error");
                Self::internal("storage error")
            }
            ag_core::Error::Process(msg) => {
                tracing::error!(error = %msg, "process error");
                Self::internal("process error")
            }
            ag_core::Error::Timeout(msg) => {
                tracing::error!(error = %msg, "timeout");
                Self::internal("timeout")
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_code_4000() {
        let mut errors = ValidationErrors::new();
        let field_error = validator::ValidationError::new("required");
        errors.add("code", field_error);

        let api_error = ApiError::validation(errors);
        assert_eq!(api_error.code, CODE_VALIDATION);
        assert_eq!(api_error.http_status, 200);
    }

    #[test]
    fn not_found_is_http_404() {
        let err = ApiError::not_found("no such control");
        assert_eq!(err.http_status, 404);
        assert_eq!(err.code, CODE_NOT_FOUND);
    }
}
