use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use relay_backend::models::chat::MessageRole;
use relay_backend::test_helpers::{parse_sse_chunks, spawn_app, spawn_app_with, TestApp};

fn stream_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/chat/stream")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send_and_parse(app: &TestApp, body: serde_json::Value) -> (StatusCode, String) {
    let response = app
        .router
        .clone()
        .oneshot(stream_request(body))
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_stream_happy_path() {
    let app = spawn_app();

    let response = app
        .router
        .clone()
        .oneshot(stream_request(json!({"message": "Hi there"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    let chunks = parse_sse_chunks(&body);

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].content, "Hello");
    assert_eq!(chunks[1].content, " world");
    assert!(!chunks[0].is_complete);
    assert!(!chunks[1].is_complete);

    let terminal = &chunks[2];
    assert!(terminal.is_complete);
    assert!(terminal.content.is_empty());

    // All frames of a turn share one session and one assistant message id.
    assert!(chunks.iter().all(|c| c.session_id == chunks[0].session_id));
    assert!(chunks.iter().all(|c| c.message_id == chunks[0].message_id));

    let messages = app.store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "Hi there");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, "Hello world");
    assert_eq!(messages[1].message_id, chunks[0].message_id);
    assert!(messages.iter().all(|m| m.session_id == chunks[0].session_id));
}

#[tokio::test]
async fn test_supplied_session_id_is_reused() {
    let app = spawn_app();

    let (status, body) =
        send_and_parse(&app, json!({"message": "Hi", "session_id": "my-session"})).await;

    assert_eq!(status, StatusCode::OK);
    let chunks = parse_sse_chunks(&body);
    assert!(chunks.iter().all(|c| c.session_id == "my-session"));
    assert!(app
        .store
        .messages()
        .iter()
        .all(|m| m.session_id == "my-session"));
}

#[tokio::test]
async fn test_omitted_session_id_is_generated_per_request() {
    let app = spawn_app();

    let (_, first_body) = send_and_parse(&app, json!({"message": "one"})).await;
    let (_, second_body) = send_and_parse(&app, json!({"message": "two"})).await;

    let first = parse_sse_chunks(&first_body);
    let second = parse_sse_chunks(&second_body);
    assert!(!first[0].session_id.is_empty());
    assert_ne!(first[0].session_id, second[0].session_id);
}

#[tokio::test]
async fn test_empty_message_is_rejected_before_any_work() {
    let app = spawn_app();

    let (status, body) = send_and_parse(&app, json!({"message": "   "})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("error"));
    assert_eq!(app.store.save_call_count(), 0);
    assert_eq!(app.generation.call_count(), 0);
}

#[tokio::test]
async fn test_error_fragment_is_forwarded_and_persisted() {
    let app = spawn_app_with(vec!["Hel", "Error: upstream failed"], 1000);

    let (status, body) = send_and_parse(&app, json!({"message": "Hi"})).await;

    assert_eq!(status, StatusCode::OK);
    let chunks = parse_sse_chunks(&body);
    assert_eq!(chunks[1].content, "Error: upstream failed");
    assert!(chunks[2].is_complete);

    let messages = app.store.messages();
    assert_eq!(messages[1].content, "HelError: upstream failed");
}

#[tokio::test]
async fn test_assistant_persist_failure_does_not_break_stream() {
    let app = spawn_app();
    // First save (user message) succeeds, second (assistant) fails.
    app.store.fail_saves_from(1);

    let (status, body) = send_and_parse(&app, json!({"message": "Hi"})).await;

    assert_eq!(status, StatusCode::OK);
    let chunks = parse_sse_chunks(&body);
    assert!(chunks.last().unwrap().is_complete);

    let messages = app.store.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn test_user_persist_failure_aborts_before_generation() {
    let app = spawn_app();
    app.store.fail_saves_from(0);

    let (status, _) = send_and_parse(&app, json!({"message": "Hi"})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.generation.call_count(), 0);
}
