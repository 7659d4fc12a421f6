//! Configuration handlers.

use crate::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// GET /config - Get current config (sensitive fields redacted)
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration", body = crate::config::Config),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let mut config = state.processor.current_config().await;

    for provider in &mut config.providers {
        if provider.password.is_some() {
            provider.password = Some("***REDACTED***".to_string());
        }
    }
    if config.api.api_key.is_some() {
        config.api.api_key = Some("***REDACTED***".to_string());
    }

    (StatusCode::OK, Json(config))
}

/// PATCH /config - Update runtime-changeable configuration
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body(content = crate::config::ConfigUpdate, description = "Configuration updates (runtime-changeable fields only)"),
    responses(
        (status = 200, description = "Configuration updated", body = crate::config::Config),
        (status = 400, description = "Invalid configuration"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<crate::config::ConfigUpdate>,
) -> impl IntoResponse {
    if let Err(e) = state.processor.update_config(update).await {
        return e.into_response();
    }
    get_config(State(state)).await.into_response()
}
