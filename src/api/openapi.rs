//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the usenet-poster REST
//! API using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the usenet-poster REST API.
///
/// The spec can be accessed via:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "usenet-poster REST API",
        version = "0.1.0",
        description = "OpenAPI 3.1 compliant REST API for inspecting and controlling a Usenet binary posting engine",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8780/api/v1", description = "Local development server")
    ),
    paths(
        // Queue
        crate::api::routes::list_queue,
        crate::api::routes::add_job,
        crate::api::routes::queue_stats,
        crate::api::routes::list_running,
        crate::api::routes::retry_job,
        crate::api::routes::remove_job,
        crate::api::routes::set_priority,
        crate::api::routes::pause_queue,
        crate::api::routes::resume_queue,

        // Servers
        crate::api::routes::provider_health,
        crate::api::routes::test_server,
        crate::api::routes::test_all_servers,

        // Configuration
        crate::api::routes::get_config,
        crate::api::routes::update_config,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::Status,
        crate::types::Priority,
        crate::types::ProgressEntry,
        crate::types::ProgressKind,
        crate::types::RunningJobDetails,
        crate::types::QueueItem,
        crate::types::Event,
        crate::types::CheckedAgainst,
        crate::types::ProviderRole,
        crate::types::ProviderHealth,
        crate::types::ProviderTestResult,

        // Queue types
        crate::queue::QueueStats,

        // Config types from config.rs
        crate::config::Config,
        crate::config::ConfigUpdate,
        crate::config::ProviderConfig,
        crate::config::PoolConfig,
        crate::config::PostingConfig,
        crate::config::PostCheckConfig,
        crate::config::Par2Config,
        crate::config::NzbCompressionConfig,
        crate::config::QueueConfig,
        crate::config::WatcherConfig,
        crate::config::ScheduleWindow,
        crate::config::PostUploadScriptConfig,
        crate::config::RetryConfig,
        crate::config::ApiConfig,
        crate::config::RateLimitConfig,

        // API request/response types from routes/mod.rs
        crate::api::routes::AddJobRequest,
        crate::api::routes::SetPriorityRequest,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "queue", description = "Job listing, enqueuing, and queue-wide pause/resume"),
        (name = "servers", description = "Provider health snapshots and connectivity testing"),
        (name = "config", description = "Configuration - get and update runtime settings"),
        (name = "system", description = "System endpoints - health checks, OpenAPI spec, events, shutdown"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add API key authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
