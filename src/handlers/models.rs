//! Model listing and self-test handlers

use crate::handlers::AppState;
use crate::services::calculator::{SAMPLE_INPUT_TOKENS, SAMPLE_MODEL, SAMPLE_OUTPUT_TOKENS};
use crate::utils::error::AppResult;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Supported models response
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Configured aliases, sorted
    pub supported_models: Vec<String>,
    /// Models the provider itself knows about
    pub total_provider_models: usize,
}

/// Sample calculation response
#[derive(Debug, Serialize, Deserialize)]
pub struct TestCalculationResponse {
    pub test_model: String,
    pub test_tokens: String,
    pub energy_kwh: f64,
    pub gwp_kgco2eq: f64,
    pub success: bool,
    pub environment: String,
}

/// GET /models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        supported_models: state.calculator.aliases(),
        total_provider_models: state.calculator.provider().models().len(),
    })
}

/// GET /test
///
/// Only routed outside production.
pub async fn test_calculation(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<TestCalculationResponse>> {
    info!("Test calculation requested");

    let result = state.calculator.run_sample().await?;

    Ok(Json(TestCalculationResponse {
        test_model: SAMPLE_MODEL.to_string(),
        test_tokens: format!(
            "{} input + {} output",
            SAMPLE_INPUT_TOKENS, SAMPLE_OUTPUT_TOKENS
        ),
        energy_kwh: result.energy_kwh,
        gwp_kgco2eq: result.gwp_kgco2eq,
        success: result.success,
        environment: state.settings.environment.to_string(),
    }))
}
