//! Remote impact provider
//!
//! Calls an external impact-calculation service over HTTP

use super::{ImpactProvider, ImpactQuery, ProviderError};
use crate::config::ProviderConfig;
use crate::models::ImpactEstimate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Base delay time (milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay time (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        Duration::from_millis(std::cmp::min(
            self.base_delay_ms.saturating_mul(factor),
            self.max_delay_ms,
        ))
    }
}

#[derive(Debug, Serialize)]
struct RemoteImpactRequest<'a> {
    model: &'a str,
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct RemoteImpactResponse {
    energy_kwh: f64,
    gwp_kgco2eq: f64,
}

/// Outcome of a single attempt
enum Attempt {
    Done(Result<ImpactEstimate, ProviderError>),
    Retryable(String),
}

/// Remote provider
pub struct RemoteProvider {
    client: Client,
    base_url: String,
    advertised_models: Vec<String>,
    retry_config: RetryConfig,
}

impl RemoteProvider {
    /// Create a remote provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .context("provider.base_url is required for the remote provider")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("impact-webhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            advertised_models: config.models.iter().map(|m| m.to_lowercase()).collect(),
            retry_config: RetryConfig {
                max_retries: config.max_retries,
                base_delay_ms: config.retry_base_delay_ms,
                ..RetryConfig::default()
            },
        })
    }

    fn build_url(&self) -> String {
        format!("{}/impacts", self.base_url)
    }

    async fn attempt(&self, query: &ImpactQuery) -> Attempt {
        let body = RemoteImpactRequest {
            model: &query.model,
            input_tokens: query.input_tokens,
            output_tokens: query.output_tokens,
        };

        let response = match self.client.post(self.build_url()).json(&body).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retryable(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Attempt::Done(Err(ProviderError::UnknownModel(query.model.clone())));
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retryable(format!("provider returned {}", status));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Remote provider rejected request: {} - {}", status, error_text);
            return Attempt::Done(Err(ProviderError::Computation(format!(
                "provider returned {}",
                status
            ))));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Retryable(format!("failed to read body: {}", e)),
        };

        Attempt::Done(parse_estimate(&bytes))
    }
}

/// Parse a provider body, rejecting anything not fully usable
fn parse_estimate(bytes: &[u8]) -> Result<ImpactEstimate, ProviderError> {
    let parsed: RemoteImpactResponse = serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    let estimate = ImpactEstimate {
        energy_kwh: parsed.energy_kwh,
        gwp_kgco2eq: parsed.gwp_kgco2eq,
    };

    if !estimate.is_valid() {
        return Err(ProviderError::MalformedResponse(
            "negative or non-finite impact values".to_string(),
        ));
    }

    Ok(estimate)
}

#[async_trait]
impl ImpactProvider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn supports(&self, model: &str) -> bool {
        // Without an advertised list the remote service decides
        self.advertised_models.is_empty() || self.advertised_models.iter().any(|m| m == model)
    }

    fn models(&self) -> Vec<String> {
        self.advertised_models.clone()
    }

    async fn estimate(&self, query: &ImpactQuery) -> Result<ImpactEstimate, ProviderError> {
        debug!("Sending remote impact request for model: {}", query.model);

        let mut last_error = String::new();

        for attempt in 0..=self.retry_config.max_retries {
            match self.attempt(query).await {
                Attempt::Done(result) => return result,
                Attempt::Retryable(reason) => {
                    last_error = reason;

                    if attempt < self.retry_config.max_retries {
                        let delay = self.retry_config.delay_for(attempt);
                        warn!(
                            "Remote provider call failed ({}), retrying after {}ms (attempt {}/{})",
                            last_error,
                            delay.as_millis(),
                            attempt + 1,
                            self.retry_config.max_retries
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ProviderError::Computation(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(8), Duration::from_millis(1000));
        assert_eq!(config.delay_for(200), Duration::from_millis(1000));
    }

    #[test]
    fn test_parse_estimate() {
        let estimate = parse_estimate(br#"{"energy_kwh": 0.5, "gwp_kgco2eq": 0.2}"#).unwrap();
        assert_eq!(estimate.energy_kwh, 0.5);

        assert!(matches!(
            parse_estimate(br#"{"energy_kwh": 0.5}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_estimate(br#"{"energy_kwh": -1.0, "gwp_kgco2eq": 0.2}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_estimate(b"<html>oops</html>"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_supports_advertised_models() {
        let config = ProviderConfig {
            kind: crate::config::ProviderKind::Remote,
            base_url: Some("http://localhost:9".to_string()),
            models: vec!["GPT-4o".to_string()],
            ..ProviderConfig::default()
        };
        let provider = RemoteProvider::new(&config).unwrap();

        assert!(provider.supports("gpt-4o"));
        assert!(!provider.supports("gpt-4"));
    }
}
