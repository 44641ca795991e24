mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use common::{classifier, state_with, test_config};
use plant_service::services::chat::{LIGHT_REPLY, WATERING_REPLY};
use plant_service::services::providers::{ChatProvider, MockChatProvider};
use plant_service::startup::build_router;
use plant_service::AppState;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

async fn post_chat(state: AppState, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat/text")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn fallback_reply_is_deterministic_without_key() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);

    let (status, first) = post_chat(state.clone(), json!({ "text": "몬스테라 물 주기" })).await;
    let (_, second) = post_chat(state, json!({ "text": "몬스테라 물 주기" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["reply"], WATERING_REPLY);
    assert_eq!(first, second);
}

#[tokio::test]
async fn blank_text_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);

    let (status, body) = post_chat(state.clone(), json!({ "text": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (status, _) = post_chat(state, json!({ "room_id": "r1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overlong_input_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);

    let (status, _) = post_chat(state.clone(), json!({ "text": "가".repeat(4001) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_chat(state, json!({ "text": "hi", "room_id": "r".repeat(129) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let state = state_with(test_config(), classifier(vec![1.0]), None);

    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat/text")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{ not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn llm_failure_falls_back_to_keywords() {
    let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::failing("500"));
    let state = state_with(test_config(), classifier(vec![1.0]), Some(provider));

    let (status, body) = post_chat(state, json!({ "text": "light?", "room_id": "r1" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], LIGHT_REPLY);
}

#[tokio::test]
async fn history_stays_within_cap() {
    let mut config = test_config();
    config.chat.history_limit = 4;
    let provider = Arc::new(MockChatProvider::replying("답변"));
    let shared: Arc<dyn ChatProvider> = provider.clone();
    let state = state_with(config, classifier(vec![1.0]), Some(shared));

    for i in 0..5 {
        let (status, body) =
            post_chat(state.clone(), json!({ "text": format!("질문 {}", i), "room_id": "room" }))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "답변");
    }

    let history = state.chat.history().snapshot("room");
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].text(), "질문 3");
    assert_eq!(history[2].text(), "질문 4");

    // system prompt + 4 prior turns + new user message
    assert_eq!(provider.last_messages().len(), 6);
}
