//! Built-in impact provider
//!
//! Estimates energy from model size: each generated token costs
//! `ALPHA * active_params + BETA` Wh, prompt tokens a fraction of that,
//! scaled by data-centre PUE and converted to emissions with a world-average
//! electricity mix.

use super::{ImpactProvider, ImpactQuery, ProviderError};
use crate::models::ImpactEstimate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

/// Wh per output token per billion active parameters
const ENERGY_ALPHA: f64 = 8.91e-5;
/// Fixed Wh per output token
const ENERGY_BETA: f64 = 1.43e-3;
/// Cost of a prompt token relative to a generated one
const INPUT_TOKEN_WEIGHT: f64 = 0.05;
/// Power usage effectiveness
const DATACENTER_PUE: f64 = 1.2;
/// kgCO2eq per kWh, world mix
const GRID_CARBON_INTENSITY: f64 = 0.59;

/// Known models and their active parameter counts in billions
static MODEL_PARAMETERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", 220.0),
        ("gpt-4o-mini", 8.0),
        ("gpt-4", 280.0),
        ("gpt-4-turbo", 220.0),
        ("gpt-3.5-turbo", 20.0),
        ("claude-3-opus", 250.0),
        ("claude-3-sonnet", 70.0),
        ("claude-3-haiku", 20.0),
        ("claude-3-5-sonnet", 70.0),
        ("gemini-pro", 60.0),
        ("gemini-1.5-pro", 220.0),
        ("gemini-1.5-flash", 30.0),
        ("mistral-large", 123.0),
        ("mistral-small", 22.0),
        ("llama-3-70b", 70.0),
        ("llama-3-8b", 8.0),
    ])
});

/// In-process estimator over a static parameter table
#[derive(Debug, Default)]
pub struct BuiltinProvider;

impl BuiltinProvider {
    pub fn new() -> Self {
        Self
    }

    fn compute(active_params_b: f64, input_tokens: u64, output_tokens: u64) -> ImpactEstimate {
        let wh_per_token = ENERGY_ALPHA * active_params_b + ENERGY_BETA;
        let weighted_tokens = output_tokens as f64 + input_tokens as f64 * INPUT_TOKEN_WEIGHT;
        let energy_kwh = weighted_tokens * wh_per_token * DATACENTER_PUE / 1000.0;

        ImpactEstimate {
            energy_kwh,
            gwp_kgco2eq: energy_kwh * GRID_CARBON_INTENSITY,
        }
    }
}

#[async_trait]
impl ImpactProvider for BuiltinProvider {
    fn name(&self) -> &str {
        "builtin"
    }

    fn supports(&self, model: &str) -> bool {
        MODEL_PARAMETERS.contains_key(model)
    }

    fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = MODEL_PARAMETERS.keys().map(|m| m.to_string()).collect();
        models.sort();
        models
    }

    async fn estimate(&self, query: &ImpactQuery) -> Result<ImpactEstimate, ProviderError> {
        let params = MODEL_PARAMETERS
            .get(query.model.as_str())
            .copied()
            .ok_or_else(|| ProviderError::UnknownModel(query.model.clone()))?;

        let estimate = Self::compute(params, query.input_tokens, query.output_tokens);
        if !estimate.is_valid() {
            return Err(ProviderError::Computation(format!(
                "non-finite estimate for {}",
                query.model
            )));
        }

        debug!(
            "Builtin estimate for {}: energy={} kWh, gwp={} kgCO2eq",
            query.model, estimate.energy_kwh, estimate.gwp_kgco2eq
        );
        Ok(estimate)
    }
}
