use super::*;
use axum::body::{Body, to_bytes};
use axum::http::Request;

#[tokio::test]
async fn openapi_endpoint_returns_valid_json() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor, config);

    let response = app
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let _value: serde_json::Value = serde_json::from_slice(&body).unwrap();
}

#[tokio::test]
async fn shutdown_endpoint_cancels_the_processor() {
    let (processor, config, _dir) = test_processor().await;
    let app = create_router(processor.clone(), config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/shutdown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn processor_events_are_observable_via_subscribe() {
    let (processor, _config, dir) = test_processor().await;
    let mut events = processor.subscribe();

    processor
        .add_file(dir.path().join("a.bin"), 10, crate::types::Priority::Normal)
        .await
        .unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, crate::types::Event::Queued { .. }));
}
