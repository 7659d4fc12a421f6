//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for inspecting and
//! controlling the posting engine: queue listing and mutation, provider
//! health, and server-sent lifecycle events. This front-end is optional —
//! [`crate::processor::Processor`] is fully usable without it.

use crate::processor::Processor;
use crate::{Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Queue
/// - `GET /queue` - List every known job
/// - `POST /queue` - Enqueue a file or folder by path
/// - `GET /queue/stats` - Row counts per queue state
/// - `GET /queue/running` - Detail on jobs currently processing
/// - `POST /queue/:id/retry` - Requeue an errored job
/// - `DELETE /queue/:id` - Remove a job
/// - `PATCH /queue/:id/priority` - Change a pending job's priority
/// - `POST /queue/pause` - Pause dequeuing
/// - `POST /queue/resume` - Resume dequeuing
///
/// ## Servers
/// - `GET /servers/health` - Per-provider connection pool snapshot
/// - `POST /servers/test` - Test connectivity for an arbitrary provider
/// - `GET /servers/test-all` - Test connectivity for every configured provider
///
/// ## Configuration
/// - `GET /config` - Get current config (sensitive fields redacted)
/// - `PATCH /config` - Update runtime-changeable configuration
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
/// - `POST /shutdown` - Graceful shutdown
pub fn create_router(processor: Arc<Processor>, config: Arc<Config>) -> Router {
    let state = AppState::new(processor);

    let router = Router::new()
        .route("/queue", get(routes::list_queue))
        .route("/queue", post(routes::add_job))
        .route("/queue/stats", get(routes::queue_stats))
        .route("/queue/running", get(routes::list_running))
        .route("/queue/pause", post(routes::pause_queue))
        .route("/queue/resume", post(routes::resume_queue))
        .route("/queue/:id/retry", post(routes::retry_job))
        .route("/queue/:id", delete(routes::remove_job))
        .route("/queue/:id/priority", patch(routes::set_priority))
        .route("/servers/health", get(routes::provider_health))
        .route("/servers/test", post(routes::test_server))
        .route("/servers/test-all", get(routes::test_all_servers))
        .route("/config", get(routes::get_config))
        .route("/config", patch(routes::update_config))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .route("/shutdown", post(routes::shutdown));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // Middleware layer ordering: In Axum's onion model, the LAST layer applied
    // is the OUTERMOST (runs first on requests). We want:
    //   Request → Rate Limit → Auth → Handler
    // So we apply auth FIRST (innermost), then rate limiting SECOND (outermost).

    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = if config.api.rate_limit.enabled {
        let limiter = Arc::new(rate_limit::RateLimiter::new(config.api.rate_limit.clone()));
        router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit_middleware,
        ))
    } else {
        router
    };

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address. Runs until the
/// listener errors or the process is killed; `POST /shutdown` triggers the
/// processor's own cancellation but does not by itself stop this listener.
pub async fn start_api_server(processor: Arc<Processor>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(processor, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
