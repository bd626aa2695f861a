//! Impact Webhook Server
//!
//! HTTP service that answers usage webhooks with energy and emissions estimates

use anyhow::{Context, Result};
use impact_webhook::utils::logging::init_logging;
use impact_webhook::{create_router, version_info, AppConfig, Settings};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Environment settings come first so logging is configured before anything else logs
    let settings = Settings::new().context("Failed to load server settings")?;
    init_logging(&settings.logging)?;

    info!("{}", version_info());

    let app_config = AppConfig::load_default().context("Failed to load configuration")?;
    settings
        .validate_against(&app_config)
        .context("Security configuration is incomplete")?;

    info!(
        "Configuration loaded: environment={}, provider={:?}, {} model mappings",
        settings.environment,
        app_config.provider.kind,
        app_config.model_mappings.len()
    );

    let addr = settings.bind_address(&app_config);
    let app = create_router(settings, app_config).await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 Impact webhook server started!");
    info!("📝 Health check: http://{}/health", addr);
    info!("🧮 Calculation endpoint: http://{}/calculate", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
