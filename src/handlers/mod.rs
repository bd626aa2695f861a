//! HTTP handlers module
//!
//! Contains all HTTP endpoint handling logic and router assembly

pub mod calculate;
pub mod health;
pub mod models;

use crate::config::{AppConfig, CorsConfig, Settings};
use crate::middleware::{
    auth_middleware, rate_limit_middleware, request_logging_middleware, signature_middleware,
    AuthGate, SignatureVerifier,
};
use crate::providers::{create_provider, ImpactProvider};
use crate::services::{CalculationService, RateLimiter};
use crate::utils::error::AppError;
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, Uri},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state
///
/// Built once at startup from an immutable configuration snapshot.
pub struct AppState {
    pub settings: Settings,
    pub config: Arc<AppConfig>,
    pub calculator: CalculationService,
    pub rate_limiter: RateLimiter,
    pub auth_gate: AuthGate,
    pub verifier: SignatureVerifier,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, config: AppConfig, provider: Arc<dyn ImpactProvider>) -> Self {
        let auth_gate = AuthGate::new(config.security.enable_auth, settings.api_key.as_ref());
        let verifier = SignatureVerifier::new(
            config.security.enable_webhook_signature,
            settings.webhook_secret.clone(),
        );

        Self {
            calculator: CalculationService::new(&config, provider),
            rate_limiter: RateLimiter::from_config(&config.rate_limiting),
            auth_gate,
            verifier,
            settings,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Create application router
pub async fn create_router(settings: Settings, config: AppConfig) -> Result<Router> {
    let provider = create_provider(&config.provider)?;
    create_router_with_provider(settings, config, provider)
}

/// Create application router around an already built provider
pub fn create_router_with_provider(
    settings: Settings,
    config: AppConfig,
    provider: Arc<dyn ImpactProvider>,
) -> Result<Router> {
    build_router(Arc::new(AppState::new(settings, config, provider)))
}

/// Assemble routes and middleware around shared state
pub fn build_router(state: Arc<AppState>) -> Result<Router> {
    let config = state.config.clone();

    // Last layer added runs first: signature, then auth, then rate limit
    let calculate_routes = Router::new()
        .route("/calculate", post(calculate::handle_calculate))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(from_fn_with_state(state.clone(), signature_middleware));

    let mut router = Router::new()
        .merge(calculate_routes)
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/models", get(models::list_models));

    if !state.settings.is_production() {
        router = router.route("/test", get(models::test_calculation));
    }

    // Outermost first
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_logging_middleware))
        .layer(DefaultBodyLimit::max(config.request.max_body_bytes));

    let router = router
        .fallback(not_found)
        .with_state(state.clone())
        .layer(middleware_stack);

    let router = if config.cors.enabled {
        router.layer(cors_layer(&config.cors, &config)?)
    } else {
        router
    };

    info!(
        "Router initialized: environment={}, auth={}, signature={}, rate_limit={}",
        state.settings.environment,
        state.auth_gate.is_enabled(),
        state.verifier.is_enabled(),
        config.rate_limiting.enabled
    );

    Ok(router)
}

fn cors_layer(cors: &CorsConfig, config: &AppConfig) -> Result<CorsLayer> {
    let origins = cors
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    for name in [
        &config.security.api_key_header,
        &config.security.signature_header,
        &config.security.client_id_header,
    ] {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        if !headers.contains(&name) {
            headers.push(name);
        }
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(headers))
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
