//! Data models module
//!
//! Defines request and response data structures for the calculation webhook

pub mod calculation;

pub use calculation::{CalculationRequest, CalculationResult, ImpactEstimate};
