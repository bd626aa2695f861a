//! Environment settings
//!
//! Deployment environment, logging and secrets supplied out of band

use crate::config::AppConfig;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Parse an environment name, falling back to development
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("development") => Environment::Development,
            Some("testing") => Environment::Testing,
            Some("production") => Environment::Production,
            Some(other) => {
                warn!("Invalid environment value '{}', defaulting to development", other);
                Environment::Development
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    pub level: String,
    /// Log format (text/json)
    pub format: String,
}

/// Settings read from the process environment
///
/// Secrets are wrapped so `Debug` never prints them.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    /// Expected API key (`API_KEY`)
    pub api_key: Option<SecretString>,
    /// Shared webhook secret (`WEBHOOK_SECRET`)
    pub webhook_secret: Option<SecretString>,
    /// `SERVER_HOST` override
    pub host_override: Option<String>,
    /// `PORT` override
    pub port_override: Option<u16>,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Create settings from the process environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .map(SecretString::from)
        };

        let port_override = match lookup("PORT") {
            Some(port) => Some(port.trim().parse::<u16>().context("Invalid port number")?),
            None => None,
        };

        let settings = Self {
            environment: Environment::parse_or_default(lookup("ENVIRONMENT").as_deref()),
            api_key: secret("API_KEY"),
            webhook_secret: secret("WEBHOOK_SECRET"),
            host_override: lookup("SERVER_HOST").filter(|h| !h.trim().is_empty()),
            port_override,
            logging: LoggingConfig {
                level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        if self.port_override == Some(0) {
            anyhow::bail!("Port number cannot be 0");
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }

    /// Check that every enabled security feature has its secret
    pub fn validate_against(&self, config: &AppConfig) -> Result<()> {
        if config.security.enable_auth && self.api_key.is_none() {
            anyhow::bail!("Authentication is enabled but API_KEY is not set");
        }

        if config.security.enable_webhook_signature && self.webhook_secret.is_none() {
            anyhow::bail!("Webhook signature verification is enabled but WEBHOOK_SECRET is not set");
        }

        Ok(())
    }

    /// Listen address with environment overrides applied
    pub fn bind_address(&self, config: &AppConfig) -> String {
        let host = self.host_override.as_deref().unwrap_or(&config.server.host);
        let port = self.port_override.unwrap_or(config.server.port);
        format!("{}:{}", host, port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            api_key: None,
            webhook_secret: None,
            host_override: None,
            port_override: None,
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_settings_from_lookup() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ENVIRONMENT", "production"),
            ("API_KEY", "test-api-key-12345"),
            ("PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.api_key.as_ref().unwrap().expose_secret(), "test-api-key-12345");
        assert!(settings.webhook_secret.is_none());
        assert_eq!(settings.port_override, Some(9100));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("API_KEY", "super-secret-key"),
            ("WEBHOOK_SECRET", "whsec-value"),
        ]))
        .unwrap();

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("whsec-value"));
    }

    #[test]
    fn test_invalid_environment_defaults_to_development() {
        assert_eq!(Environment::parse_or_default(Some("staging")), Environment::Development);
        assert_eq!(Environment::parse_or_default(None), Environment::Development);
        assert_eq!(Environment::parse_or_default(Some("Testing")), Environment::Testing);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Settings::from_lookup(lookup_from(&[("PORT", "not-a-port")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("PORT", "0")])).is_err());
    }

    #[test]
    fn test_enabled_auth_requires_api_key() {
        let mut config = AppConfig::default();
        config.security.enable_auth = true;

        let settings = Settings::default();
        assert!(settings.validate_against(&config).is_err());

        let settings = Settings::from_lookup(lookup_from(&[("API_KEY", "k-123456789")])).unwrap();
        assert!(settings.validate_against(&config).is_ok());
    }
}
