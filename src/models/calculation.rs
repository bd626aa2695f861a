//! Calculation webhook data models
//!
//! Wire format of `POST /calculate` requests and responses

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Usage payload sent by the webhook caller
///
/// Token counts are signed on the wire so that negative values reach
/// validation and produce a descriptive error instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationRequest {
    /// Public model name or alias
    pub model: String,
    /// Prompt tokens
    pub input_tokens: i64,
    /// Completion tokens
    pub output_tokens: i64,
    /// Opaque caller metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl CalculationRequest {
    /// Create a request without metadata
    pub fn new(model: impl Into<String>, input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            output_tokens,
            metadata: None,
        }
    }
}

/// Energy and emissions figures for one model invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ImpactEstimate {
    /// Energy in kilowatt-hours
    pub energy_kwh: f64,
    /// Global warming potential in kg CO2 equivalent
    pub gwp_kgco2eq: f64,
}

impl ImpactEstimate {
    /// Both values finite and non-negative
    pub fn is_valid(&self) -> bool {
        self.energy_kwh.is_finite()
            && self.gwp_kgco2eq.is_finite()
            && self.energy_kwh >= 0.0
            && self.gwp_kgco2eq >= 0.0
    }
}

/// Response of a successful calculation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationResult {
    /// Requested model name (normalized)
    pub model: String,
    /// Identifier the provider computed against
    pub canonical_model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub energy_kwh: f64,
    pub gwp_kgco2eq: f64,
    /// Unique per request, for tracing only
    pub calculation_id: String,
    /// Completion time, RFC 3339 UTC
    pub timestamp: String,
    pub success: bool,
    pub error: Option<String>,
}

impl CalculationResult {
    /// Assemble a result from already validated parts
    pub fn assemble(
        model: String,
        canonical_model: String,
        input_tokens: u64,
        output_tokens: u64,
        estimate: ImpactEstimate,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            model,
            canonical_model,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            energy_kwh: estimate.energy_kwh,
            gwp_kgco2eq: estimate.gwp_kgco2eq,
            calculation_id: new_calculation_id(),
            timestamp: completed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            success: true,
            error: None,
        }
    }
}

/// Generate a fresh calculation id
pub fn new_calculation_id() -> String {
    format!("calc-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_negative_tokens() {
        let request: CalculationRequest =
            serde_json::from_str(r#"{"model":"gpt-4o","input_tokens":-1,"output_tokens":5}"#).unwrap();
        assert_eq!(request.input_tokens, -1);
        assert!(request.metadata.is_none());
    }

    #[test]
    fn test_result_serializes_null_error() {
        let estimate = ImpactEstimate { energy_kwh: 0.001, gwp_kgco2eq: 0.0005 };
        let result = CalculationResult::assemble(
            "gpt-4o".to_string(),
            "gpt-4o".to_string(),
            1000,
            500,
            estimate,
            Utc::now(),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total_tokens"], 1500);
        assert_eq!(json["success"], true);
        assert!(json["error"].is_null());
        assert!(json["calculation_id"].as_str().unwrap().starts_with("calc-"));
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_calculation_ids_are_unique() {
        assert_ne!(new_calculation_id(), new_calculation_id());
    }

    #[test]
    fn test_estimate_validity() {
        assert!(ImpactEstimate { energy_kwh: 0.0, gwp_kgco2eq: 0.0 }.is_valid());
        assert!(!ImpactEstimate { energy_kwh: -0.1, gwp_kgco2eq: 0.0 }.is_valid());
        assert!(!ImpactEstimate { energy_kwh: f64::NAN, gwp_kgco2eq: 0.0 }.is_valid());
    }
}
