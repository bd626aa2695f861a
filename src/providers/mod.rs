//! Provider module
//!
//! Defines the impact provider capability and its implementations

pub mod builtin;
pub mod remote;

use crate::config::{ProviderConfig, ProviderKind};
use crate::models::ImpactEstimate;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Input of one impact computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactQuery {
    /// Canonical model id, already resolved from any alias
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provider-side failures
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider does not know this model
    #[error("Model '{0}' not found by provider")]
    UnknownModel(String),

    /// The provider failed while computing
    #[error("Computation failed: {0}")]
    Computation(String),

    /// The provider answered with something unusable
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Impact provider trait
///
/// Implementations must be side-effect free from the caller's point of view:
/// calling `estimate` twice for the same query must not double-count anything.
#[async_trait]
pub trait ImpactProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Whether the provider recognizes this canonical id
    fn supports(&self, model: &str) -> bool;

    /// Models the provider knows about (may be empty for remote providers)
    fn models(&self) -> Vec<String>;

    /// Compute the impact estimate for a query
    async fn estimate(&self, query: &ImpactQuery) -> Result<ImpactEstimate, ProviderError>;
}

/// Build the provider selected by configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ImpactProvider>> {
    let provider: Arc<dyn ImpactProvider> = match config.kind {
        ProviderKind::Builtin => Arc::new(BuiltinProvider::new()),
        ProviderKind::Remote => Arc::new(RemoteProvider::new(config)?),
    };

    info!("Impact provider initialized: {}", provider.name());
    Ok(provider)
}

pub use builtin::BuiltinProvider;
pub use remote::RemoteProvider;
