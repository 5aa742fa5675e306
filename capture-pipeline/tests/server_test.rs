use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use capture_pipeline::controller::{CaptureController, LoopConfig};
use capture_pipeline::enrichment::{LookupConfig, PokeApiLookup};
use capture_pipeline::frame_source::StillFrameSource;
use capture_pipeline::llm_adapter::{MockLlmAdapter, MockReply};
use capture_pipeline::server::{router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn app_state(dir: &TempDir) -> (AppState, Arc<MockLlmAdapter>) {
    let still = dir.path().join("frame.png");
    std::fs::write(&still, b"png").unwrap();

    let lookup = Arc::new(PokeApiLookup::new("http://127.0.0.1:9", LookupConfig::default()).unwrap());
    let adapter = Arc::new(MockLlmAdapter::new("test"));
    let controller = CaptureController::new(
        LoopConfig {
            interval: Duration::from_millis(20),
            summary_interval: 5,
        },
        Arc::new(StillFrameSource::new(still)),
        adapter.clone(),
        lookup,
        "describe".to_string(),
    );

    let state = AppState {
        controller,
        chat: adapter.clone(),
        keep_alive: Duration::from_secs(10),
    };
    (state, adapter)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn chat_request(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = app_state(&dir);
    let response = router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_chat_answers() {
    let dir = tempfile::tempdir().unwrap();
    let (state, adapter) = app_state(&dir);
    adapter.push_chat(MockReply::Text("Tepig is a Fire type.".to_string()));

    let response = router(state)
        .oneshot(chat_request(r#"{"message":"What type is Tepig?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["response"], "Tepig is a Fire type.");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_chat_rejects_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = app_state(&dir);
    let app = router(state);

    let response = app.clone().oneshot(chat_request("not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No JSON data provided");

    let response = app.oneshot(chat_request(r#"{"message":"   "}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No message provided");
}

#[tokio::test]
async fn test_chat_failure_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let (state, adapter) = app_state(&dir);
    adapter.push_chat(MockReply::Fail("model offline".to_string()));

    let response = router(state).oneshot(chat_request(r#"{"message":"hi"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Chat error:"));
    assert!(error.contains("model offline"));
}

#[tokio::test]
async fn test_analysis_stream_starts_loop_and_delivers_events() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = app_state(&dir);
    let controller = state.controller.clone();

    let response = router(state)
        .oneshot(Request::builder().uri("/stream/analysis").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.contains(r#""type":"analysis""#));

    controller.stop();
    drop(body);
    controller.join().await;
}
