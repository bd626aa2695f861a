//! Logging utilities
//!
//! Tracing subscriber setup and log-safe request summaries

use crate::config::LoggingConfig;
use crate::models::CalculationRequest;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// `format` is `json` for production log shipping, anything else is human readable.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if config.format == "json" {
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        )
    };

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))?;

    tracing::info!("Logging system initialized");
    Ok(())
}

/// Summary of a request that is safe to log
///
/// Metadata is opaque caller data, so only its key count is shown.
pub fn request_log_summary(request: &CalculationRequest) -> serde_json::Value {
    serde_json::json!({
        "model": truncate(&request.model, 100),
        "input_tokens": request.input_tokens,
        "output_tokens": request.output_tokens,
        "metadata_keys": request.metadata.as_ref().map(|m| m.len()),
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... ({} bytes truncated)", &s[..idx], s.len() - idx),
        None => s.to_string(),
    }
}
