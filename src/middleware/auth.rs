//! Authentication middleware
//!
//! Handles API key validation and derives the client identity used for rate limiting

use crate::handlers::AppState;
use crate::utils::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Longest caller-supplied client id accepted as an identity
const MAX_CLIENT_ID_LEN: usize = 128;

/// API key gate
///
/// Only a digest of the expected key is kept; presented keys are hashed the
/// same way and compared in constant time.
#[derive(Clone)]
pub struct AuthGate {
    enabled: bool,
    expected_digest: Option<[u8; 32]>,
}

impl AuthGate {
    pub fn new(enabled: bool, expected: Option<&SecretString>) -> Self {
        Self {
            enabled,
            expected_digest: expected.map(|key| digest(key.expose_secret())),
        }
    }

    /// A gate that accepts everything
    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check a presented key
    pub fn check(&self, presented: Option<&str>) -> Result<(), AppError> {
        if !self.enabled {
            return Ok(());
        }

        let presented = presented
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::Authentication("API key required".to_string()))?;

        let Some(expected) = &self.expected_digest else {
            return Err(AppError::Authentication("API key not configured".to_string()));
        };

        if bool::from(digest(presented).ct_eq(expected)) {
            Ok(())
        } else {
            Err(AppError::Authentication("Invalid API key".to_string()))
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Extract the API key from a header value, dropping a `Bearer` scheme
pub fn extract_api_key(header_value: &str) -> Option<&str> {
    let value = header_value.trim();
    let token = match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        // A scheme with no credentials
        None if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Rate limiter key and audit context for one request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive the identity of a request
    ///
    /// Order: API key fingerprint, caller-supplied client id, forwarded
    /// address, peer address, then `anonymous`. Raw keys never appear.
    pub fn resolve(
        headers: &HeaderMap,
        api_key: Option<&str>,
        client_id_header: &str,
        peer: Option<SocketAddr>,
    ) -> Self {
        if let Some(key) = api_key {
            let fingerprint = hex::encode(digest(key));
            return Self(format!("key:{}", &fingerprint[..12]));
        }

        if let Some(client_id) = headers
            .get(client_id_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_CLIENT_ID_LEN)
        {
            return Self(format!("client:{}", client_id));
        }

        if let Some(ip) = forwarded_ip(headers) {
            return Self(format!("ip:{}", ip));
        }

        match peer {
            Some(addr) => Self(format!("ip:{}", addr.ip())),
            None => Self("anonymous".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded_for.split(',').next().map(str::trim) {
            if !ip.is_empty() && ip != "unknown" {
                return Some(ip.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Authentication middleware
///
/// Rejects requests failing the API key gate and attaches a `ClientIdentity`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let security = &state.config.security;

    let api_key = request
        .headers()
        .get(&security.api_key_header)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_api_key);

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let identity = ClientIdentity::resolve(request.headers(), api_key, &security.client_id_header, peer);

    if let Err(e) = state.auth_gate.check(api_key) {
        warn!(client = %identity, "Authentication rejected");
        return Err(e);
    }

    debug!(client = %identity, "Authentication passed");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
