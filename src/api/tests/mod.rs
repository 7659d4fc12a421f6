use super::*;
use crate::config::ProviderConfig;
use crate::processor::Processor;
use crate::queue::Queue;
use crate::Config;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

mod queue;
mod servers;
mod system;

/// Build a processor wired to a fresh, temp-file-backed queue and a single
/// configured (but never actually contacted) provider.
async fn test_processor() -> (Arc<Processor>, Arc<Config>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("queue.db");
    let queue = Queue::open(&db_path).await.unwrap();

    let mut config = Config::default();
    config.providers = vec![ProviderConfig {
        host: "news.example.com".into(),
        ..Default::default()
    }];
    config.queue.database_path = db_path;
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let config = Arc::new(config);
    let processor = Arc::new(
        Processor::new((*config).clone(), queue, CancellationToken::new()).unwrap(),
    );
    (processor, config, dir)
}

#[tokio::test]
async fn api_server_spawns_and_can_be_aborted() {
    let (processor, config, _dir) = test_processor().await;

    let handle = tokio::spawn(async move { start_api_server(processor, config).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();
}

#[tokio::test]
async fn cors_headers_present_when_enabled() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_key_rejects_unauthenticated_requests() {
    let (processor, mut config, _dir) = test_processor().await;
    Arc::get_mut(&mut config).unwrap().api.api_key = Some("secret".into());
    let app = create_router(processor, config);

    let response = app
        .oneshot(Request::builder().uri("/queue/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_key_allows_authenticated_requests() {
    let (processor, mut config, _dir) = test_processor().await;
    Arc::get_mut(&mut config).unwrap().api.api_key = Some("secret".into());
    let app = create_router(processor, config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/queue/stats")
                .header("X-Api-Key", "secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn swagger_ui_mounted_when_enabled() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
