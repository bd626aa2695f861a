//! Service layer module
//!
//! Contains the calculation orchestrator, model resolver, and rate limiter

pub mod calculator;
pub mod rate_limiter;
pub mod resolver;

pub use calculator::{CalculationService, CalculationStage, ValidationLimits};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use resolver::{ModelResolver, ResolvedModel};
