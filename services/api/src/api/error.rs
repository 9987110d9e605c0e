//! API error types and helpers.
//!
//! # Purpose and responsibility
//! The HTTP boundary is the only place component errors become status codes.
//! Handlers build responses through these helpers so the `{code, error,
//! errors?}` envelope stays uniform.
//!
//! # Security considerations
//! - Internal errors are logged server-side; clients get a generic message.
//! - Every authentication failure looks the same to the client.
use crate::api::types::ErrorResponse;
use crate::finance::FinanceError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use clearflow::api::error::api_not_found;
///
/// let err = api_not_found("missing");
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            error: message.to_string(),
            errors: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

/// Build a 400 from one malformed-input message.
pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Build a 400 listing every field problem; `error` joins them with `"; "`.
pub fn api_validation_errors(errors: Vec<String>) -> ApiError {
    let mut err = api_validation_error(&errors.join("; "));
    err.body.errors = Some(errors);
    err
}

pub fn api_unavailable(message: &str) -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
}

/// Build a 500 Internal Server Error from a store error.
///
/// # What it does
/// Logs the store error and returns a generic internal error response.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "clearflow storage error");
    api_internal_message(message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map a finance service failure, using `action` in the 500 message.
pub fn api_finance_error(action: &str, err: FinanceError) -> ApiError {
    match err {
        FinanceError::UserNotRegistered(_) => api_error(
            StatusCode::NOT_FOUND,
            "user_not_registered",
            "user is not registered",
        ),
        FinanceError::CategoryNotFound(_) => api_not_found("category not found"),
        FinanceError::CategoryForbidden(_) => {
            api_forbidden("category belongs to another user")
        }
        FinanceError::Store(StoreError::NotFound(_)) => api_not_found("resource not found"),
        FinanceError::Store(err) => api_internal(&format!("failed to {action}"), &err),
    }
}
