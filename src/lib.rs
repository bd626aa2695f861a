//! Impact Webhook Library
//!
//! Estimates the energy use and emissions of AI model invocations behind an
//! authenticated, signed and rate limited webhook

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod services;
pub mod utils;

// Re-export common types
pub use config::{AppConfig, Settings};
pub use handlers::{create_router, create_router_with_provider, AppState};
pub use models::{CalculationRequest, CalculationResult, ImpactEstimate};
pub use providers::{ImpactProvider, ImpactQuery, ProviderError};
pub use utils::error::{AppError, AppResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
