//! Error types for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use marketpay_types::PaymentError;
use std::fmt;

/// Gateway error type.
#[derive(Debug)]
pub enum Error {
    /// Configuration error.
    Config(String),
    /// Payment flow error (validation, wallet, recording).
    Payment(PaymentError),
    /// Marketplace backend communication error.
    Backend(String),
    /// No record for the requested resource.
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Payment(e) => write!(f, "{e}"),
            Error::Backend(msg) => write!(f, "backend error: {msg}"),
            Error::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<PaymentError> for Error {
    fn from(e: PaymentError) -> Self {
        Error::Payment(e)
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Backend(_) => StatusCode::BAD_GATEWAY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Payment(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Error::Payment(PaymentError::BackendRecordFailed(_)) => StatusCode::BAD_GATEWAY,
            Error::Payment(_) => StatusCode::CONFLICT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Backend(_) => "backend",
            Error::NotFound(_) => "not_found",
            Error::Payment(e) => e.code(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = matches!(&self, Error::Payment(e) if e.is_retryable())
            || matches!(self, Error::Backend(_));
        let body = serde_json::json!({
            "success": false,
            "code": self.code(),
            "retryable": retryable,
            "error": self.to_string()
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::from(PaymentError::InvalidAmount("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::from(PaymentError::SubmissionExpired { valid_until: 0 }).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::from(PaymentError::BackendRecordFailed("down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::NotFound("payment".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Config("bad".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
