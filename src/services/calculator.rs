//! Calculation orchestrator
//!
//! Drives one request through Received -> Validated -> Resolved -> Computed.
//! Any failure is terminal and is reported as the stage it happened in.

use crate::config::AppConfig;
use crate::models::{CalculationRequest, CalculationResult};
use crate::providers::{ImpactProvider, ImpactQuery, ProviderError};
use crate::services::resolver::{ModelResolver, ResolvedModel};
use crate::utils::error::{AppError, AppResult};
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Model and token counts used by the sample calculation
pub const SAMPLE_MODEL: &str = "gpt-4o";
pub const SAMPLE_INPUT_TOKENS: i64 = 1000;
pub const SAMPLE_OUTPUT_TOKENS: i64 = 500;

/// Orchestration stage a request has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationStage {
    Received,
    Validated,
    Resolved,
    Computed,
}

impl fmt::Display for CalculationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalculationStage::Received => "received",
            CalculationStage::Validated => "validated",
            CalculationStage::Resolved => "resolved",
            CalculationStage::Computed => "computed",
        };
        f.write_str(name)
    }
}

/// Input bounds enforced before resolution
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_total_tokens: u64,
    pub metadata_max_bytes: usize,
    pub metadata_max_items: usize,
}

impl ValidationLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_total_tokens: config.security.max_tokens_per_request,
            metadata_max_bytes: config.security.metadata_max_bytes,
            metadata_max_items: config.security.metadata_max_items,
        }
    }

    /// Check token and metadata invariants, returning unsigned counts
    pub fn validate(&self, request: &CalculationRequest) -> AppResult<(u64, u64)> {
        let input_tokens = non_negative("input_tokens", request.input_tokens)?;
        let output_tokens = non_negative("output_tokens", request.output_tokens)?;

        let total = input_tokens
            .checked_add(output_tokens)
            .filter(|total| *total <= self.max_total_tokens)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "total tokens exceed the maximum of {}",
                    self.max_total_tokens
                ))
            })?;
        debug!("Validated token counts, total={}", total);

        if let Some(metadata) = &request.metadata {
            self.validate_metadata(metadata)?;
        }

        Ok((input_tokens, output_tokens))
    }

    fn validate_metadata(&self, metadata: &Map<String, Value>) -> AppResult<()> {
        if metadata.len() > self.metadata_max_items {
            return Err(AppError::Validation(format!(
                "metadata may contain at most {} items",
                self.metadata_max_items
            )));
        }

        let size = serde_json::to_vec(metadata)
            .map_err(|e| AppError::Validation(format!("metadata is not serializable: {}", e)))?
            .len();
        if size > self.metadata_max_bytes {
            return Err(AppError::Validation(format!(
                "metadata exceeds {} bytes",
                self.metadata_max_bytes
            )));
        }

        Ok(())
    }
}

fn non_negative(field: &str, value: i64) -> AppResult<u64> {
    u64::try_from(value)
        .map_err(|_| AppError::Validation(format!("{} must be a non-negative integer", field)))
}

/// Calculation service
pub struct CalculationService {
    resolver: ModelResolver,
    limits: ValidationLimits,
    timeout: Duration,
}

impl CalculationService {
    pub fn new(config: &AppConfig, provider: Arc<dyn ImpactProvider>) -> Self {
        Self {
            resolver: ModelResolver::new(&config.model_mappings, provider),
            limits: ValidationLimits::from_config(config),
            timeout: Duration::from_secs(config.request.timeout_seconds),
        }
    }

    /// Override the provider call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<dyn ImpactProvider> {
        self.resolver.provider()
    }

    /// Sorted configured aliases
    pub fn aliases(&self) -> Vec<String> {
        self.resolver.aliases()
    }

    /// Run one calculation
    ///
    /// `client` is used for logging only.
    pub async fn calculate(
        &self,
        request: &CalculationRequest,
        client: &str,
    ) -> AppResult<CalculationResult> {
        let mut stage = CalculationStage::Received;

        match self.run(request, &mut stage).await {
            Ok(result) => {
                info!(
                    client = %client,
                    model = %result.model,
                    canonical_model = %result.canonical_model,
                    total_tokens = result.total_tokens,
                    calculation_id = %result.calculation_id,
                    "Calculation completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    client = %client,
                    model = %request.model,
                    stage = %stage,
                    code = e.error_code(),
                    "Calculation failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &CalculationRequest,
        stage: &mut CalculationStage,
    ) -> AppResult<CalculationResult> {
        let (input_tokens, output_tokens) = self.limits.validate(request)?;
        *stage = CalculationStage::Validated;

        let ResolvedModel {
            requested,
            canonical,
            ..
        } = self.resolver.resolve(&request.model)?;
        *stage = CalculationStage::Resolved;

        let query = ImpactQuery {
            model: canonical,
            input_tokens,
            output_tokens,
        };

        let estimate = match tokio::time::timeout(self.timeout, self.provider().estimate(&query)).await {
            Err(_) => return Err(AppError::ProviderTimeout(self.timeout.as_secs())),
            Ok(Err(ProviderError::UnknownModel(model))) => {
                return Err(AppError::ModelNotSupported(format!(
                    "Model '{}' not supported by provider {}",
                    model,
                    self.provider().name()
                )))
            }
            Ok(Err(e)) => return Err(AppError::ProviderComputation(e.to_string())),
            Ok(Ok(estimate)) => estimate,
        };

        if !estimate.is_valid() {
            return Err(AppError::ProviderComputation(
                "provider returned negative or non-finite values".to_string(),
            ));
        }
        *stage = CalculationStage::Computed;

        Ok(CalculationResult::assemble(
            requested,
            query.model,
            input_tokens,
            output_tokens,
            estimate,
            Utc::now(),
        ))
    }

    /// Calculate the fixed sample request
    pub async fn run_sample(&self) -> AppResult<CalculationResult> {
        let request = CalculationRequest::new(SAMPLE_MODEL, SAMPLE_INPUT_TOKENS, SAMPLE_OUTPUT_TOKENS);
        self.calculate(&request, "self-test").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImpactEstimate;
    use crate::providers::BuiltinProvider;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedProvider(Result<ImpactEstimate, &'static str>);

    #[async_trait]
    impl ImpactProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn supports(&self, _model: &str) -> bool {
            true
        }

        fn models(&self) -> Vec<String> {
            Vec::new()
        }

        async fn estimate(&self, _query: &ImpactQuery) -> Result<ImpactEstimate, ProviderError> {
            self.0
                .map_err(|detail| ProviderError::Computation(detail.to_string()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl ImpactProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn supports(&self, _model: &str) -> bool {
            true
        }

        fn models(&self) -> Vec<String> {
            Vec::new()
        }

        async fn estimate(&self, _query: &ImpactQuery) -> Result<ImpactEstimate, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ImpactEstimate { energy_kwh: 1.0, gwp_kgco2eq: 1.0 })
        }
    }

    fn service() -> CalculationService {
        CalculationService::new(&AppConfig::default(), Arc::new(BuiltinProvider::new()))
    }

    #[tokio::test]
    async fn test_successful_calculation() {
        let request = CalculationRequest::new("gpt-4o", 1000, 500);
        let result = service().calculate(&request, "test").await.unwrap();

        assert_eq!(result.model, "gpt-4o");
        assert_eq!(result.canonical_model, "gpt-4o");
        assert_eq!(result.total_tokens, 1500);
        assert!(result.energy_kwh > 0.0);
        assert!(result.success);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_alias_resolves_to_canonical() {
        let request = CalculationRequest::new("claude-3-haiku-20240307", 10, 10);
        let result = service().calculate(&request, "test").await.unwrap();

        assert_eq!(result.model, "claude-3-haiku-20240307");
        assert_eq!(result.canonical_model, "claude-3-haiku");
    }

    #[tokio::test]
    async fn test_negative_tokens_rejected() {
        let request = CalculationRequest::new("gpt-4o", -1, 10);
        let result = service().calculate(&request, "test").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_token_ceiling_is_inclusive() {
        let service = service();

        let at_limit = CalculationRequest::new("gpt-4o", 999_999, 1);
        assert!(service.calculate(&at_limit, "test").await.is_ok());

        let over = CalculationRequest::new("gpt-4o", 1_000_000, 1);
        assert!(matches!(
            service.calculate(&over, "test").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_limits() {
        let service = service();

        let mut request = CalculationRequest::new("gpt-4o", 1, 1);
        request.metadata = Some(json!({"scenario": "make", "run": 7}).as_object().unwrap().clone());
        assert!(service.calculate(&request, "test").await.is_ok());

        let too_many: Map<String, Value> = (0..11).map(|i| (format!("k{}", i), json!(i))).collect();
        request.metadata = Some(too_many);
        assert!(matches!(
            service.calculate(&request, "test").await,
            Err(AppError::Validation(_))
        ));

        let too_big: Map<String, Value> = [("blob".to_string(), json!("x".repeat(2000)))].into_iter().collect();
        request.metadata = Some(too_big);
        assert!(matches!(
            service.calculate(&request, "test").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_runs_before_resolution() {
        let request = CalculationRequest::new("no-such-model", -5, 0);
        let result = service().calculate(&request, "test").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_model_not_found() {
        let request = CalculationRequest::new("no-such-model", 5, 5);
        let result = service().calculate(&request, "test").await;
        assert!(matches!(result, Err(AppError::ModelNotSupported(_))));
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_computation_error() {
        let service = CalculationService::new(
            &AppConfig::default(),
            Arc::new(FixedProvider(Err("division by zero"))),
        );
        let result = service.calculate(&CalculationRequest::new("gpt-4o", 1, 1), "test").await;
        assert!(matches!(result, Err(AppError::ProviderComputation(_))));
    }

    #[tokio::test]
    async fn test_invalid_estimate_is_computation_error() {
        let estimate = ImpactEstimate { energy_kwh: f64::INFINITY, gwp_kgco2eq: 0.1 };
        let service = CalculationService::new(&AppConfig::default(), Arc::new(FixedProvider(Ok(estimate))));
        let result = service.calculate(&CalculationRequest::new("gpt-4o", 1, 1), "test").await;
        assert!(matches!(result, Err(AppError::ProviderComputation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout() {
        let service = CalculationService::new(&AppConfig::default(), Arc::new(SlowProvider))
            .with_timeout(Duration::from_secs(2));
        let result = service.calculate(&CalculationRequest::new("gpt-4o", 1, 1), "test").await;
        assert!(matches!(result, Err(AppError::ProviderTimeout(2))));
    }

    #[tokio::test]
    async fn test_run_sample() {
        let result = service().run_sample().await.unwrap();
        assert_eq!(result.total_tokens, 1500);
        assert_eq!(result.model, SAMPLE_MODEL);
    }
}
