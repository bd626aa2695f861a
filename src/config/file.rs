//! File-based configuration loading
//!
//! Loads model mappings, security flags and rate limits from a JSON file

use anyhow::{Context, Result};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub enable_auth: bool,

    #[serde(default)]
    pub enable_webhook_signature: bool,

    /// Upper bound on input + output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u64,

    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Header carrying the webhook signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Header a caller may use to name itself for rate limiting
    #[serde(default = "default_client_id_header")]
    pub client_id_header: String,

    /// Serialized metadata size cap in bytes
    #[serde(default = "default_metadata_max_bytes")]
    pub metadata_max_bytes: usize,

    /// Metadata key count cap
    #[serde(default = "default_metadata_max_items")]
    pub metadata_max_items: usize,
}

fn default_max_tokens() -> u64 {
    1_000_000
}

fn default_api_key_header() -> String {
    "Authorization".to_string()
}

fn default_signature_header() -> String {
    "X-Webhook-Signature".to_string()
}

fn default_client_id_header() -> String {
    "X-Client-Id".to_string()
}

fn default_metadata_max_bytes() -> usize {
    1000
}

fn default_metadata_max_items() -> usize {
    10
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_auth: false,
            enable_webhook_signature: false,
            max_tokens_per_request: default_max_tokens(),
            api_key_header: default_api_key_header(),
            signature_header: default_signature_header(),
            client_id_header: default_client_id_header(),
            metadata_max_bytes: default_metadata_max_bytes(),
            metadata_max_items: default_metadata_max_items(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_window_seconds() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_requests_per_minute(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Impact provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process estimator
    Builtin,
    /// External HTTP calculation service
    Remote,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type", default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// Base URL of a remote provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-attempt HTTP timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Models a remote provider advertises; empty means "ask the provider"
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Builtin
}

fn default_provider_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: None,
            timeout_seconds: default_provider_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            models: Vec::new(),
        }
    }
}

/// Request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Orchestrator timeout for the provider call, in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://hook.eu1.make.com".to_string(),
        "https://hook.us1.make.com".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Versioned and plain model names mapped to the names providers know
pub fn default_model_mappings() -> HashMap<String, String> {
    [
        ("gpt-4o-2024-05-13", "gpt-4o"),
        ("gpt4o-2024-05-13", "gpt-4o"),
        ("gpt-4o-mini-2024-07-18", "gpt-4o-mini"),
        ("gpt4o-mini-2024-07-18", "gpt-4o-mini"),
        ("gpt-3.5-turbo-0125", "gpt-3.5-turbo"),
        ("gpt-4-0613", "gpt-4"),
        ("claude-3-opus-20240229", "claude-3-opus"),
        ("claude-3-sonnet-20240229", "claude-3-sonnet"),
        ("claude-3-haiku-20240307", "claude-3-haiku"),
        ("claude-3-5-sonnet-20240620", "claude-3-5-sonnet"),
        ("gemini-1.0-pro", "gemini-pro"),
        ("gemini-1.5-pro-001", "gemini-1.5-pro"),
        ("gpt-4o", "gpt-4o"),
        ("gpt-4o-mini", "gpt-4o-mini"),
        ("gpt-3.5-turbo", "gpt-3.5-turbo"),
        ("gpt-4", "gpt-4"),
    ]
    .into_iter()
    .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
    .collect()
}

/// Application configuration loaded from JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Public alias -> canonical provider model id
    #[serde(default = "default_model_mappings")]
    pub model_mappings: HashMap<String, String>,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub rate_limiting: RateLimitConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model_mappings: default_model_mappings(),
            security: SecurityConfig::default(),
            rate_limiting: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
            request: RequestConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_json_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        debug!("Loaded {} model mappings", config.model_mappings.len());
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. the path in `CONFIG_FILE`
    /// 2. ~/.config/impact-webhook/config.json
    /// 3. ./config.json
    ///
    /// Falls back to built-in defaults when no file exists.
    pub fn load_default() -> Result<Self> {
        match Self::find_config_file(std::env::var("CONFIG_FILE").ok()) {
            Some(path) => Self::load(&path),
            None => {
                info!("No configuration file found, using built-in defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Locate the configuration file to use
    fn find_config_file(explicit: Option<String>) -> Option<PathBuf> {
        // An explicit path is returned even if missing so the read error surfaces
        if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
            return Some(PathBuf::from(path));
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("impact-webhook").join("config.json");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        let local_path = PathBuf::from("config.json");
        if local_path.exists() {
            return Some(local_path);
        }

        None
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Port number cannot be 0");
        }

        if self.security.max_tokens_per_request == 0 {
            anyhow::bail!("security.max_tokens_per_request must be greater than 0");
        }

        for (label, name) in [
            ("api_key_header", &self.security.api_key_header),
            ("signature_header", &self.security.signature_header),
            ("client_id_header", &self.security.client_id_header),
        ] {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name for security.{}: {:?}", label, name))?;
        }

        if self.rate_limiting.requests_per_minute == 0 {
            anyhow::bail!("rate_limiting.requests_per_minute must be at least 1");
        }

        if self.rate_limiting.window_seconds == 0 {
            anyhow::bail!("rate_limiting.window_seconds must be at least 1");
        }

        if self.request.timeout_seconds == 0 || self.provider.timeout_seconds == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        if self.request.max_body_bytes == 0 {
            anyhow::bail!("request.max_body_bytes cannot be 0");
        }

        if self.provider.kind == ProviderKind::Remote {
            match &self.provider.base_url {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => anyhow::bail!("Invalid provider base URL: {}", url),
                None => anyhow::bail!("provider.base_url is required for the remote provider"),
            }
        }

        for (alias, canonical) in &self.model_mappings {
            if alias.trim().is_empty() || canonical.trim().is_empty() {
                anyhow::bail!("Model mapping entries cannot be empty ({:?} -> {:?})", alias, canonical);
            }
        }

        Ok(())
    }
}
