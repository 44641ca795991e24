mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::{
    classifier, multipart_body, multipart_content_type, png_bytes, state_with, test_config,
    write_guides, TestApp, GUIDES_JSON,
};
use plant_service::services::providers::{ChatProvider, MockChatProvider};
use plant_service::startup::build_router;
use plant_service::AppState;
use reqwest::multipart;
use std::sync::Arc;
use tower::ServiceExt;

async fn post_analyze(router: Router, content_type: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/plant/analyze")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn analyze_png(state: AppState, field: &str) -> (StatusCode, serde_json::Value) {
    let body = multipart_body(field, "leaf.png", "image/png", &png_bytes(64, 48, [30, 160, 40]));
    post_analyze(build_router(state), &multipart_content_type(), body).await
}

#[tokio::test]
async fn valid_image_returns_label_and_guidance() {
    let state = state_with(test_config(), classifier(vec![0.1, 0.85, 0.05]), None);

    let (status, body) = analyze_png(state, "image").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let result = &body["result"];
    assert_eq!(result["label"], "powdery_mildew");
    let confidence = result["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(result["nameKo"], "흰가루병");
    assert_eq!(result["solution"], "감염 잎 제거");
    assert_eq!(result["references"][0], "https://example.org/powdery");
    assert!(result["extraTips"].is_null());
}

#[tokio::test]
async fn file_field_is_accepted_as_alias() {
    let state = state_with(test_config(), classifier(vec![0.9, 0.1, 0.0]), None);

    let (status, body) = analyze_png(state, "file").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["label"], "healthy");
}

#[tokio::test]
async fn unknown_label_gets_fallback_guidance() {
    let state = state_with(test_config(), classifier(vec![0.1, 0.1, 0.8]), None);

    let (status, body) = analyze_png(state, "image").await;

    assert_eq!(status, StatusCode::OK);
    let result = &body["result"];
    assert_eq!(result["label"], "mosaic_virus");
    assert_eq!(result["nameKo"], "mosaic_virus");
    assert!(result["description"].as_str().unwrap().contains("mosaic_virus"));
    assert!(!result["solution"].as_str().unwrap().is_empty());
    assert!(result.get("references").is_none());
}

#[tokio::test]
async fn enrichment_tips_are_included() {
    let provider: Arc<dyn ChatProvider> =
        Arc::new(MockChatProvider::replying("통풍을 자주 시켜 주세요."));
    let state = state_with(test_config(), classifier(vec![0.1, 0.9, 0.0]), Some(provider));

    let (status, body) = analyze_png(state, "image").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["extraTips"], "통풍을 자주 시켜 주세요.");
}

#[tokio::test]
async fn failed_enrichment_still_succeeds() {
    let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::failing("upstream down"));
    let state = state_with(test_config(), classifier(vec![0.1, 0.9, 0.0]), Some(provider));

    let (status, body) = analyze_png(state, "image").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["result"]["extraTips"].is_null());
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);
    let body = multipart_body("image", "notes.txt", "text/plain", b"hello");

    let (status, body) = post_analyze(build_router(state), &multipart_content_type(), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn undecodable_image_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);
    let body = multipart_body("image", "leaf.png", "image/png", b"\x89PNG\r\n\x1a\nbroken");

    let (status, _) = post_analyze(build_router(state), &multipart_content_type(), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);
    let body = multipart_body("image", "leaf.png", "image/png", b"");

    let (status, body) = post_analyze(build_router(state), &multipart_content_type(), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Empty"));
}

#[tokio::test]
async fn missing_image_field_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);
    let body = multipart_body("photo", "leaf.png", "image/png", &png_bytes(4, 4, [0, 0, 0]));

    let (status, _) = post_analyze(build_router(state), &multipart_content_type(), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let mut config = test_config();
    config.vision.max_upload_bytes = 64;
    let state = state_with(config, classifier(vec![1.0]), None);
    let body = multipart_body("image", "leaf.png", "image/png", &png_bytes(256, 256, [1, 2, 3]));

    let (status, _) = post_analyze(build_router(state), &multipart_content_type(), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_multipart_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);

    let (status, _) = post_analyze(
        build_router(state.clone()),
        &multipart_content_type(),
        b"this is not multipart at all".to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_analyze(build_router(state), "application/json", b"{}".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_model_is_server_not_ready() {
    let (_dir, guides_path) = write_guides(GUIDES_JSON);
    let mut config = test_config();
    config.guides.path = guides_path;
    config.classifier.model_path = "models/definitely-missing.onnx".to_string();

    let state = AppState::from_config(config).await.unwrap();
    assert!(state.analysis.guides_ready());
    assert!(!state.analysis.is_ready());

    let (status, body) = analyze_png(state.clone(), "image").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Server not ready"));

    let response = build_router(state)
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn missing_guides_are_server_not_ready() {
    let mut config = test_config();
    config.guides.path = "does/not/exist.json".to_string();

    let state = AppState::from_config(config).await.unwrap();
    assert!(!state.analysis.guides_ready());
}

#[tokio::test]
async fn analyze_over_http_with_reqwest_multipart() {
    let state = state_with(test_config(), classifier(vec![0.7, 0.2, 0.1]), None);
    let app = TestApp::spawn(state).await;

    let form = multipart::Form::new().part(
        "image",
        multipart::Part::bytes(png_bytes(100, 80, [200, 200, 200]))
            .file_name("leaf.png")
            .mime_str("image/png")
            .unwrap(),
    );

    let response = reqwest::Client::new()
        .post(format!("{}/plant/analyze", app.address))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["label"], "healthy");
    assert_eq!(body["result"]["confidence"], 0.7);
}
