use super::*;
use axum::body::{Body, to_bytes};
use axum::http::Request;
use serde_json::{Value, json};

#[tokio::test]
async fn add_list_and_stats_roundtrip() {
    let (processor, config, dir) = test_processor().await;
    let app = create_router(processor, config);

    let source = dir.path().join("movie.bin");
    std::fs::write(&source, vec![0u8; 1024]).unwrap();

    let add_body = json!({ "path": source.to_string_lossy(), "folder": false });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue")
                .header("content-type", "application/json")
                .body(Body::from(add_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let stats_response = app
        .clone()
        .oneshot(Request::builder().uri("/queue/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(stats_response.status(), StatusCode::OK);
    let body = to_bytes(stats_response.into_body(), usize::MAX).await.unwrap();
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["pending"], 1);

    let list_response = app
        .oneshot(Request::builder().uri("/queue").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let body = to_bytes(list_response.into_body(), usize::MAX).await.unwrap();
    let items: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(items.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn add_job_rejects_missing_path() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let add_body = json!({ "path": "/nonexistent/path/does/not/exist", "folder": false });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue")
                .header("content-type", "application/json")
                .body(Body::from(add_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error() || response.status().is_server_error());
}

#[tokio::test]
async fn pause_and_resume_toggle_processor_state() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor.clone(), config);

    assert!(!processor.is_paused());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/pause")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(processor.is_paused());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/resume")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!processor.is_paused());
}

#[tokio::test]
async fn remove_job_returns_no_content_for_known_job() {
    let (processor, config, dir) = test_processor().await;
    let job_id = processor
        .add_file(dir.path().join("a.bin"), 10, crate::types::Priority::Normal)
        .await
        .unwrap();
    let app = create_router(processor, config);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/queue/{}", job_id.get()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn remove_job_returns_error_for_unknown_job() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/queue/999999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error() || response.status().is_server_error());
}

#[tokio::test]
async fn set_priority_updates_pending_job() {
    let (processor, config, dir) = test_processor().await;
    let job_id = processor
        .add_file(dir.path().join("a.bin"), 10, crate::types::Priority::Normal)
        .await
        .unwrap();
    let app = create_router(processor, config);

    let body = json!({ "priority": "high" });
    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/queue/{}/priority", job_id.get()))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn running_jobs_list_starts_empty() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let response = app
        .oneshot(Request::builder().uri("/queue/running").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let items: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(items.as_array().unwrap().len(), 0);
}
