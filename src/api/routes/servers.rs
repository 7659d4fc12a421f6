//! Provider health and connectivity-test handlers.

use crate::api::AppState;
use crate::config::ProviderConfig;
use axum::{Json, extract::State, response::IntoResponse};

/// GET /servers/health - Per-provider connection pool snapshot
#[utoipa::path(
    get,
    path = "/api/v1/servers/health",
    tag = "servers",
    responses(
        (status = 200, description = "Provider health snapshots", body = [crate::types::ProviderHealth])
    )
)]
pub async fn provider_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.processor.provider_health().await)
}

/// POST /servers/test - Probe connectivity for an arbitrary (not necessarily
/// configured) provider, without consuming a pool lease
#[utoipa::path(
    post,
    path = "/api/v1/servers/test",
    tag = "servers",
    request_body = crate::config::ProviderConfig,
    responses(
        (status = 200, description = "Connectivity test result", body = crate::types::ProviderTestResult)
    )
)]
pub async fn test_server(
    State(state): State<AppState>,
    Json(candidate): Json<ProviderConfig>,
) -> impl IntoResponse {
    Json(state.processor.test_provider(&candidate).await)
}

/// GET /servers/test-all - Probe connectivity for every configured provider
#[utoipa::path(
    get,
    path = "/api/v1/servers/test-all",
    tag = "servers",
    responses(
        (status = 200, description = "Connectivity test results for all configured providers", body = [crate::types::ProviderTestResult])
    )
)]
pub async fn test_all_servers(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.processor.current_config().await;
    let mut results = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        results.push(state.processor.test_provider(provider).await);
    }
    Json(results)
}
