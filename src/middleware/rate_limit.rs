//! Rate limiting middleware

use crate::handlers::AppState;
use crate::middleware::auth::ClientIdentity;
use crate::services::rate_limiter::RateDecision;
use crate::utils::error::AppError;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Whole seconds a client should wait, never less than one
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Rate limiting middleware
///
/// Runs after authentication so the limiter is keyed by the resolved client.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.rate_limiting.enabled {
        return Ok(next.run(request).await);
    }

    let client = request
        .extensions()
        .get::<ClientIdentity>()
        .map(|identity| identity.as_str().to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    match state.rate_limiter.check(&client) {
        RateDecision::Admitted { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
            Ok(response)
        }
        RateDecision::Limited { retry_after } => {
            let retry_after_secs = retry_after_secs(retry_after);
            warn!(client = %client, retry_after_secs, "Rate limit exceeded");
            Err(AppError::RateLimited { retry_after_secs })
        }
    }
}
