//! Error handling module
//!
//! Defines the request-level error taxonomy and its HTTP mapping

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
///
/// Every variant is terminal for the request that produced it.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or wrong API key
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Webhook signature missing or not matching the body
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// Request validation failed
    #[error("Request validation failed: {0}")]
    Validation(String),

    /// Model could not be resolved to anything the provider knows
    #[error("{0}")]
    ModelNotSupported(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Provider failed to compute an estimate (detail is internal only)
    #[error("Provider computation failed: {0}")]
    ProviderComputation(String),

    /// Provider did not answer within the request timeout
    #[error("Provider timed out after {0}s")]
    ProviderTimeout(u64),

    /// Payload too large
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Unknown route
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Error details
    pub error: ErrorBody,
    /// Seconds until the next request may be admitted (rate limiting only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl AppError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::SignatureVerification(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ModelNotSupported(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ProviderComputation(_)
            | AppError::ProviderTimeout(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "authentication_failed",
            AppError::SignatureVerification(_) => "signature_verification_failed",
            AppError::Validation(_) => "validation_failed",
            AppError::ModelNotSupported(_) => "model_not_supported",
            AppError::RateLimited { .. } => "rate_limit_exceeded",
            AppError::ProviderComputation(_) => "provider_computation_failed",
            AppError::ProviderTimeout(_) => "provider_timeout",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Message shown to the caller
    ///
    /// Provider and internal failures never expose their detail text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ProviderComputation(_) => "Impact calculation failed".to_string(),
            AppError::ProviderTimeout(_) => "Impact calculation timed out".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether detailed error information should be logged
    pub fn should_log_details(&self) -> bool {
        !matches!(
            self,
            AppError::Authentication(_) | AppError::SignatureVerification(_)
        )
    }

    /// Convert to the JSON error body
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.public_message(),
            },
            retry_after_seconds: match self {
                AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                _ => None,
            },
        }
    }
}

/// Implement IntoResponse trait to allow errors to be returned directly as HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "Application error: {} - Status code: {}", self, status);
        } else if self.should_log_details() {
            tracing::warn!(code = self.error_code(), "Client error: {} - Status code: {}", self, status);
        } else {
            tracing::warn!(code = self.error_code(), "Client error - Status code: {}", status);
        }

        let mut response = (status, Json(self.to_error_response())).into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AppError::Authentication("test".to_string()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::SignatureVerification("test".to_string()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Validation("test".to_string()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::ModelNotSupported("test".to_string()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::RateLimited { retry_after_secs: 1 }.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::ProviderTimeout(5).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_provider_detail_is_hidden() {
        let error = AppError::ProviderComputation("ZeroDivisionError in layer 3".to_string());
        let body = error.to_error_response();

        assert_eq!(body.error.code, "provider_computation_failed");
        assert!(!body.error.message.contains("ZeroDivisionError"));
    }
}
