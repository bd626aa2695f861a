//! Middleware module
//!
//! Admission pipeline for `/calculate` plus request logging

pub mod auth;
pub mod logging;
pub mod rate_limit;
pub mod signature;

pub use auth::{auth_middleware, extract_api_key, AuthGate, ClientIdentity};
pub use logging::request_logging_middleware;
pub use rate_limit::rate_limit_middleware;
pub use signature::{compute_signature, signature_middleware, SignatureVerifier};
