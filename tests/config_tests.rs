//! Configuration module tests

use impact_webhook::config::{AppConfig, Environment, ProviderKind, Settings};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

fn settings_from(vars: &[(&str, &str)]) -> anyhow::Result<Settings> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Settings::from_lookup(move |key| vars.get(key).cloned())
}

#[test]
fn test_default_settings() {
    let settings = settings_from(&[]).unwrap();

    assert_eq!(settings.environment, Environment::Development);
    assert!(settings.api_key.is_none());
    assert!(settings.webhook_secret.is_none());
    assert_eq!(settings.logging.level, "info");
    assert_eq!(settings.logging.format, "text");
    assert!(!settings.is_production());
}

#[test]
fn test_settings_from_environment() {
    let settings = settings_from(&[
        ("ENVIRONMENT", "Production"),
        ("API_KEY", "secret-api-key"),
        ("WEBHOOK_SECRET", "secret-webhook"),
        ("PORT", "9090"),
        ("SERVER_HOST", "127.0.0.1"),
        ("RUST_LOG", "debug"),
        ("LOG_FORMAT", "json"),
    ])
    .unwrap();

    assert_eq!(settings.environment, Environment::Production);
    assert!(settings.is_production());
    assert_eq!(settings.api_key.as_ref().unwrap().expose_secret(), "secret-api-key");
    assert_eq!(settings.logging.format, "json");
    assert_eq!(settings.bind_address(&AppConfig::default()), "127.0.0.1:9090");
}

#[test]
fn test_unknown_environment_defaults_to_development() {
    let settings = settings_from(&[("ENVIRONMENT", "staging")]).unwrap();
    assert_eq!(settings.environment, Environment::Development);
}

#[test]
fn test_invalid_settings() {
    assert!(settings_from(&[("PORT", "not-a-port")]).is_err());
    assert!(settings_from(&[("PORT", "0")]).is_err());
    assert!(settings_from(&[("LOG_FORMAT", "xml")]).is_err());
}

#[test]
fn test_empty_secret_is_unset() {
    let settings = settings_from(&[("API_KEY", "")]).unwrap();
    assert!(settings.api_key.is_none());
}

#[test]
fn test_secrets_never_appear_in_debug_output() {
    let settings = settings_from(&[("API_KEY", "super-secret-key"), ("WEBHOOK_SECRET", "hush")]).unwrap();
    let debug = format!("{:?}", settings);

    assert!(!debug.contains("super-secret-key"));
    assert!(!debug.contains("hush"));
}

#[test]
fn test_enabled_security_requires_secrets() {
    let mut config = AppConfig::default();
    config.security.enable_auth = true;

    let without_key = settings_from(&[]).unwrap();
    assert!(without_key.validate_against(&config).is_err());

    let with_key = settings_from(&[("API_KEY", "k")]).unwrap();
    assert!(with_key.validate_against(&config).is_ok());

    config.security.enable_webhook_signature = true;
    assert!(with_key.validate_against(&config).is_err());

    let with_both = settings_from(&[("API_KEY", "k"), ("WEBHOOK_SECRET", "s")]).unwrap();
    assert!(with_both.validate_against(&config).is_ok());
}

#[test]
fn test_bind_address_defaults_to_config() {
    let settings = settings_from(&[]).unwrap();
    assert_eq!(settings.bind_address(&AppConfig::default()), "0.0.0.0:8000");
}

#[test]
fn test_load_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"{
            "model_mappings": {"my-model": "gpt-4o-mini"},
            "security": {"enable_webhook_signature": true, "signature_header": "X-Signature"},
            "rate_limiting": {"requests_per_minute": 30, "window_seconds": 30},
            "request": {"timeout_seconds": 3},
            "cors": {"enabled": false}
        }"#,
    )
    .unwrap();

    let config = AppConfig::load(file.path()).unwrap();

    assert_eq!(config.model_mappings.len(), 1);
    assert_eq!(config.model_mappings["my-model"], "gpt-4o-mini");
    assert!(config.security.enable_webhook_signature);
    assert_eq!(config.security.signature_header, "X-Signature");
    assert_eq!(config.rate_limiting.window_seconds, 30);
    assert_eq!(config.request.timeout_seconds, 3);
    assert!(!config.cors.enabled);
    assert_eq!(config.provider.kind, ProviderKind::Builtin);
}

#[test]
fn test_load_invalid_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{ this is not json").unwrap();
    assert!(AppConfig::load(file.path()).is_err());

    assert!(AppConfig::load(std::path::Path::new("/nonexistent/impact-webhook.json")).is_err());
}

#[test]
fn test_invalid_config_values() {
    assert!(AppConfig::from_json_str(r#"{"server": {"port": 0}}"#).is_err());
    assert!(AppConfig::from_json_str(r#"{"security": {"max_tokens_per_request": 0}}"#).is_err());
    assert!(AppConfig::from_json_str(r#"{"rate_limiting": {"window_seconds": 0}}"#).is_err());
    assert!(AppConfig::from_json_str(r#"{"request": {"max_body_bytes": 0}}"#).is_err());
    assert!(AppConfig::from_json_str(r#"{"model_mappings": {"": "gpt-4o"}}"#).is_err());
    assert!(AppConfig::from_json_str(
        r#"{"provider": {"type": "remote", "base_url": "ftp://impacts"}}"#
    )
    .is_err());
}

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert!(!config.security.enable_auth);
    assert!(!config.security.enable_webhook_signature);
    assert_eq!(config.cors.allowed_origins.len(), 2);
    assert!(config.model_mappings.contains_key("gpt-4o"));
}
