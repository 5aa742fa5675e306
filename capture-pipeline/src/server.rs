//! HTTP surface: live SSE streams for both channels and a chat endpoint.

use crate::broadcast::Subscription;
use crate::controller::CaptureController;
use crate::llm_adapter::LlmAdapter;
use crate::types::{FailureStage, PipelineEvent};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub controller: CaptureController,
    pub chat: Arc<dyn LlmAdapter>,
    pub keep_alive: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stream/analysis", get(stream_analysis))
        .route("/stream/summaries", get(stream_summaries))
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Streaming UI available at http://{}", address);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.start();
    Json(state.controller.status())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "capture-pipeline" }))
}

async fn stream_analysis(State(state): State<AppState>) -> Response {
    state.controller.start();
    event_response(state.controller.analysis_channel().subscribe(), state.keep_alive)
}

async fn stream_summaries(State(state): State<AppState>) -> Response {
    state.controller.start();
    event_response(state.controller.summary_channel().subscribe(), state.keep_alive)
}

/// Never-ending SSE response over one subscription. The subscription is
/// dropped, and so unsubscribed, when the client goes away.
fn event_response(subscription: Subscription<PipelineEvent>, keep_alive: Duration) -> Response {
    let stream = subscription.into_stream(keep_alive).map(|delivery| {
        let event = match delivery {
            Some(payload) => Event::default().data(event_data(&payload, payload.kind())),
            None => Event::default().comment("keep-alive"),
        };
        Ok::<Event, Infallible>(event)
    });

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// JSON for one `data:` line. A payload that cannot be serialized is replaced
/// by an `analysis_error` event describing the failure.
fn event_data<T: Serialize>(payload: &T, kind: &str) -> String {
    match serde_json::to_string(payload) {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to serialize {} event: {}", kind, e);
            let failure = PipelineEvent::error(
                FailureStage::Internal,
                format!("Failed to serialize {} event: {}", kind, e),
            );
            serde_json::to_string(&failure).unwrap_or_default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

async fn chat(State(state): State<AppState>, body: Result<Json<ChatRequest>, JsonRejection>) -> Response {
    let Ok(Json(request)) = body else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No JSON data provided" }))).into_response();
    };
    if request.message.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No message provided" }))).into_response();
    }

    match state.chat.chat(&request.message).await {
        Ok(response) => Json(json!({
            "response": response,
            "timestamp": Local::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => {
            error!("Chat request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Chat error: {}", e) })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cyclic payload"))
        }
    }

    #[test]
    fn unserializable_payload_becomes_error_event() {
        let data = event_data(&Unserializable, "analysis");
        let event: PipelineEvent = serde_json::from_str(&data).unwrap();
        let PipelineEvent::AnalysisError(error) = event else {
            panic!("expected an error event");
        };
        assert_eq!(error.stage, FailureStage::Internal);
        assert!(error.message.contains("cyclic payload"));
    }

    #[test]
    fn payload_serializes_as_is() {
        let event = PipelineEvent::error(FailureStage::Decode, "bad reply");
        let data = event_data(&event, event.kind());
        assert_eq!(serde_json::from_str::<PipelineEvent>(&data).unwrap(), event);
    }
}
