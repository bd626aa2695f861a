//! Webhook signature middleware
//!
//! Verifies `HMAC-SHA256(secret, raw body)` before the body is parsed

use super::auth::ClientIdentity;
use crate::handlers::AppState;
use crate::utils::error::AppError;
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256 webhook signature verifier
#[derive(Clone)]
pub struct SignatureVerifier {
    enabled: bool,
    secret: Option<SecretString>,
}

impl SignatureVerifier {
    pub fn new(enabled: bool, secret: Option<SecretString>) -> Self {
        Self { enabled, secret }
    }

    /// A verifier that accepts everything
    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check a presented signature against the exact body bytes
    ///
    /// Accepts `sha256=<hex>` or bare hex. Malformed signatures are rejections.
    pub fn verify(&self, body: &[u8], presented: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }

        let Some(secret) = &self.secret else {
            return false;
        };

        let Some(provided) = presented.and_then(decode_signature) else {
            return false;
        };

        let mut mac = match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(body);

        // verify_slice compares in constant time
        mac.verify_slice(&provided).is_ok()
    }
}

/// Compute the header value a sender would attach for `body`
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

fn decode_signature(presented: &str) -> Option<Vec<u8>> {
    let trimmed = presented.trim();
    let hex_part = match trimmed.get(..SIGNATURE_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SIGNATURE_PREFIX) => &trimmed[SIGNATURE_PREFIX.len()..],
        _ => trimmed,
    };

    hex::decode(hex_part).ok()
}

/// Signature middleware
///
/// Buffers the raw body, verifies it, then hands the same bytes downstream.
pub async fn signature_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.verifier.is_enabled() {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, state.config.request.max_body_bytes)
        .await
        .map_err(|e| {
            debug!("Failed to buffer request body: {}", e);
            AppError::PayloadTooLarge
        })?;

    let presented = parts
        .headers
        .get(&state.config.security.signature_header)
        .and_then(|v| v.to_str().ok());

    if presented.is_none() {
        let client = keyless_identity(&parts, &state.config.security.client_id_header);
        warn!(
            client = %client,
            "Missing webhook signature header: {}",
            state.config.security.signature_header
        );
        return Err(AppError::SignatureVerification("missing signature header".to_string()));
    }

    if !state.verifier.verify(&bytes, presented) {
        let client = keyless_identity(&parts, &state.config.security.client_id_header);
        warn!(client = %client, "Invalid webhook signature for {} byte body", bytes.len());
        return Err(AppError::SignatureVerification(
            "signature does not match request body".to_string(),
        ));
    }

    debug!("Webhook signature verification successful");
    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// Identity for logging before the API key has been checked
///
/// Never derived from the key, so an unverified request cannot log a key fingerprint.
pub(crate) fn keyless_identity(parts: &Parts, client_id_header: &str) -> ClientIdentity {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    ClientIdentity::resolve(&parts.headers, None, client_id_header, peer)
}
