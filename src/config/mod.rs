//! Configuration management module
//!
//! File configuration (mappings, security flags, limits) and environment settings (secrets, logging)

pub mod file;
pub mod settings;

pub use file::{
    AppConfig, CorsConfig, ProviderConfig, ProviderKind, RateLimitConfig, RequestConfig,
    SecurityConfig, ServerConfig,
};
pub use settings::{Environment, LoggingConfig, Settings};
