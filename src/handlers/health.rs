//! Health check handlers
//!
//! Provides application health status check endpoints

use crate::handlers::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const SERVICE_NAME: &str = "impact-webhook";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service name
    pub service: String,
    /// Version information
    pub version: String,
    /// Deployment environment
    pub environment: String,
    /// Timestamp
    pub timestamp: String,
    pub dependencies: DependencyStatus,
}

/// Status of what a calculation depends on
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Active provider name
    pub provider: String,
    /// Number of models the provider advertises
    pub available_models: usize,
    /// Number of configured aliases
    pub model_mappings: usize,
}

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
    pub service: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

/// Basic health check
///
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Executing health check");

    let provider = state.calculator.provider();

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.settings.environment.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        dependencies: DependencyStatus {
            provider: provider.name().to_string(),
            available_models: provider.models().len(),
            model_mappings: state.config.model_mappings.len(),
        },
    })
}

/// Liveness check
///
/// GET /health/live
/// Only confirms the process is serving; no dependencies are checked
pub async fn liveness_check(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    debug!("Executing liveness check");

    Json(LivenessResponse {
        status: "alive".to_string(),
        service: SERVICE_NAME.to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
