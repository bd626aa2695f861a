//! Calculation handler
//!
//! Handles `POST /calculate`

use crate::handlers::AppState;
use crate::middleware::ClientIdentity;
use crate::models::{CalculationRequest, CalculationResult};
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::request_log_summary;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use std::sync::Arc;
use tracing::debug;

/// Handle an impact calculation webhook
///
/// The body is taken as raw bytes so that every parse failure is reported in
/// the structured error format instead of an extractor rejection.
pub async fn handle_calculate(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<ClientIdentity>>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Json<CalculationResult>> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::Validation(rejection.body_text())
        }
    })?;

    let request = parse_request(&body)?;
    debug!("Calculation request: {}", request_log_summary(&request));

    let client = identity
        .map(|Extension(identity)| identity.as_str().to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let result = state.calculator.calculate(&request, &client).await?;
    Ok(Json(result))
}

/// Parse a request body into a `CalculationRequest`
pub fn parse_request(body: &[u8]) -> AppResult<CalculationRequest> {
    if body.is_empty() {
        return Err(AppError::Validation("request body is empty".to_string()));
    }

    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request = parse_request(br#"{"model":"gpt-4o","input_tokens":10,"output_tokens":5}"#).unwrap();
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.input_tokens, 10);
    }

    #[test]
    fn test_parse_request_failures_are_validation_errors() {
        for body in [
            &b""[..],
            b"not json",
            br#"{"model":"gpt-4o"}"#,
            br#"{"model":"gpt-4o","input_tokens":"ten","output_tokens":5}"#,
            br#"{"model":"gpt-4o","input_tokens":1.5,"output_tokens":5}"#,
            br#"{"model":"gpt-4o","input_tokens":1,"output_tokens":5,"metadata":[1]}"#,
        ] {
            assert!(matches!(parse_request(body), Err(AppError::Validation(_))));
        }
    }
}
