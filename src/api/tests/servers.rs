use super::*;
use axum::body::{Body, to_bytes};
use axum::http::Request;
use serde_json::Value;

#[tokio::test]
async fn provider_health_reports_configured_provider() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/servers/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: Value = serde_json::from_slice(&body).unwrap();
    let entries = health.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["provider"], "news.example.com:563");
}

#[tokio::test]
async fn test_server_reports_failure_for_unreachable_host() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let body = serde_json::json!({
        "host": "127.0.0.1",
        "port": 1,
        "tls": false,
        "enabled": true,
        "check_only": false,
        "max_connections": 1,
        "max_idle_seconds": 60,
        "max_ttl_seconds": 60,
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/servers/test")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let result: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(result["success"], false);
}
