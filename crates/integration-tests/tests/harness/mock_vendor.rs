//! Mock vendor backend for integration tests
//!
//! Speaks just enough of the `OpenAI`, Anthropic and Gemini wire formats to
//! return canned completions. Streaming bodies are written a few bytes at a
//! time so SSE events straddle chunk boundaries.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Model name that makes streaming endpoints send one event and then hang
pub const STALL_MODEL: &str = "stall";

/// Bytes per body frame in streamed responses
const FRAME_SIZE: usize = 5;

/// Mock vendor backend that returns predictable responses
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    request_count: AtomicU32,
    upload_count: AtomicU32,
    /// Number of requests to fail with 500 before succeeding
    fail_count: AtomicU32,
    last_request: Mutex<Option<RecordedRequest>>,
}

/// Headers and JSON body of the most recent completion request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

impl MockVendor {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0).await
    }

    /// Start a mock server that fails the first `n` requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n).await
    }

    async fn start_inner(fail_count: u32) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            fail_count: AtomicU32::new(fail_count),
            ..MockState::default()
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_openai))
            .route("/v1/models", routing::get(handle_openai_models))
            .route("/v1/messages", routing::post(handle_anthropic))
            .route("/v1beta/models/{action}", routing::post(handle_gemini))
            .route("/upload/v1beta/files", routing::post(handle_gemini_upload))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for OpenAI-compatible providers
    pub fn openai_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for Anthropic; the provider appends `/v1/messages`
    pub fn anthropic_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL for Gemini
    pub fn gemini_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Number of completion and listing requests received
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Number of Gemini file uploads received
    pub fn upload_count(&self) -> u32 {
        self.state.upload_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.last_request.lock().unwrap().clone()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockState {
    /// Count and record a request; returns a 500 while failures remain
    fn record(&self, path: String, headers: &HeaderMap, body: &Value) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(RecordedRequest {
            path,
            headers: headers.clone(),
            body: body.clone(),
        });

        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Some(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": {
                            "message": "mock server intentional failure",
                            "type": "server_error"
                        }
                    })),
                )
                    .into_response(),
            );
        }
        None
    }
}

/// SSE response written in small frames; `stall` keeps the body open forever
fn sse_response(events: &[Value], done_marker: bool, stall: bool) -> Response {
    let mut text = String::new();
    for event in events {
        text.push_str(&format!("data: {event}\n\n"));
    }
    if done_marker {
        text.push_str("data: [DONE]\n\n");
    }

    let frames: Vec<Result<Bytes, Infallible>> = text
        .into_bytes()
        .chunks(FRAME_SIZE)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();

    let body = if stall {
        Body::from_stream(stream::iter(frames).chain(stream::pending()))
    } else {
        Body::from_stream(stream::iter(frames))
    };

    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn is_streaming(body: &Value) -> bool {
    body["stream"].as_bool().unwrap_or(false)
}

fn has_tools(body: &Value) -> bool {
    body.get("tools").is_some_and(|t| !t.is_null())
}

// -- OpenAI --

async fn handle_openai(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.record("/v1/chat/completions".to_owned(), &headers, &body) {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();

    if is_streaming(&body) {
        let stall = model == STALL_MODEL;
        let chunk = |delta: Value, finish: Value| {
            json!({
                "id": "chatcmpl-mock-stream",
                "object": "chat.completion.chunk",
                "model": model,
                "choices": [{ "index": 0, "delta": delta, "finish_reason": finish }]
            })
        };

        let events = if stall {
            vec![chunk(json!({ "content": "partial" }), Value::Null)]
        } else if has_tools(&body) {
            vec![
                chunk(
                    json!({
                        "role": "assistant",
                        "tool_calls": [{
                            "index": 0,
                            "id": "call_stream_1",
                            "type": "function",
                            "function": { "name": "get_weather", "arguments": "" }
                        }]
                    }),
                    Value::Null,
                ),
                chunk(
                    json!({ "tool_calls": [{ "index": 0, "function": { "arguments": "{\"location\":" } }] }),
                    Value::Null,
                ),
                chunk(
                    json!({ "tool_calls": [{ "index": 0, "function": { "arguments": "\"Paris\"}" } }] }),
                    Value::Null,
                ),
                chunk(json!({}), json!("tool_calls")),
            ]
        } else {
            vec![
                chunk(json!({ "role": "assistant", "content": "Hello" }), Value::Null),
                chunk(json!({ "content": " from" }), Value::Null),
                chunk(json!({ "content": " mock" }), Value::Null),
                chunk(json!({}), json!("stop")),
                json!({
                    "id": "chatcmpl-mock-stream",
                    "object": "chat.completion.chunk",
                    "model": model,
                    "choices": [],
                    "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 }
                }),
            ]
        };
        return sse_response(&events, !stall, stall);
    }

    let message = if has_tools(&body) {
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_mock_1",
                "type": "function",
                "function": { "name": "get_weather", "arguments": "{\"location\":\"San Francisco\"}" }
            }]
        })
    } else {
        json!({ "role": "assistant", "content": "Hello from mock" })
    };
    let finish_reason = if has_tools(&body) { "tool_calls" } else { "stop" };

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{ "index": 0, "message": message, "finish_reason": finish_reason }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    }))
    .into_response()
}

async fn handle_openai_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(failure) = state.record("/v1/models".to_owned(), &headers, &Value::Null) {
        return failure;
    }

    Json(json!({
        "object": "list",
        "data": [
            { "id": "mock-model-1", "object": "model", "owned_by": "mock" },
            { "id": "mock-model-2", "object": "model", "owned_by": "mock" }
        ]
    }))
    .into_response()
}

// -- Anthropic --

async fn handle_anthropic(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.record("/v1/messages".to_owned(), &headers, &body) {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();

    if is_streaming(&body) {
        let start = json!({
            "type": "message_start",
            "message": {
                "id": "msg_mock_stream",
                "type": "message",
                "role": "assistant",
                "model": model,
                "content": [],
                "usage": { "input_tokens": 12, "output_tokens": 0 }
            }
        });

        let events = if has_tools(&body) {
            vec![
                start,
                json!({
                    "type": "content_block_start",
                    "index": 0,
                    "content_block": { "type": "tool_use", "id": "toolu_mock_1", "name": "get_weather", "input": {} }
                }),
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": { "type": "input_json_delta", "partial_json": "{\"location\":" }
                }),
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": { "type": "input_json_delta", "partial_json": "\"Paris\"}" }
                }),
                json!({ "type": "content_block_stop", "index": 0 }),
                json!({
                    "type": "message_delta",
                    "delta": { "stop_reason": "tool_use" },
                    "usage": { "output_tokens": 8 }
                }),
                json!({ "type": "message_stop" }),
            ]
        } else {
            vec![
                start,
                json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } }),
                json!({ "type": "ping" }),
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": { "type": "text_delta", "text": "Hello" }
                }),
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": { "type": "text_delta", "text": " from mock" }
                }),
                json!({ "type": "content_block_stop", "index": 0 }),
                json!({
                    "type": "message_delta",
                    "delta": { "stop_reason": "end_turn" },
                    "usage": { "output_tokens": 3 }
                }),
                json!({ "type": "message_stop" }),
            ]
        };
        return sse_response(&events, false, false);
    }

    let (content, stop_reason) = if has_tools(&body) {
        (
            json!([
                { "type": "text", "text": "Checking." },
                { "type": "tool_use", "id": "toolu_mock_1", "name": "get_weather", "input": { "location": "Paris" } }
            ]),
            "tool_use",
        )
    } else {
        (json!([{ "type": "text", "text": "Hello from mock" }]), "end_turn")
    };

    Json(json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "usage": { "input_tokens": 12, "output_tokens": 4 }
    }))
    .into_response()
}

// -- Gemini --

async fn handle_gemini(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.record(format!("/v1beta/models/{action}"), &headers, &body) {
        return failure;
    }

    let Some((model, method)) = action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let usage = json!({ "promptTokenCount": 6, "candidatesTokenCount": 3, "totalTokenCount": 9 });

    match method {
        "streamGenerateContent" => {
            let events = if has_tools(&body) {
                vec![json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [{ "functionCall": { "name": "get_weather", "args": { "location": "Paris" } } }]
                        },
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": usage,
                    "modelVersion": model
                })]
            } else {
                vec![
                    json!({
                        "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Hello" }] } }],
                        "modelVersion": model
                    }),
                    json!({
                        "candidates": [{
                            "content": { "role": "model", "parts": [{ "text": " from mock" }] },
                            "finishReason": "STOP"
                        }],
                        "usageMetadata": usage,
                        "modelVersion": model
                    }),
                ]
            };
            sse_response(&events, false, false)
        }
        "generateContent" => {
            let parts = if has_tools(&body) {
                json!([{ "functionCall": { "name": "get_weather", "args": { "location": "Paris" } } }])
            } else {
                json!([{ "text": "Hello from mock" }])
            };
            Json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": parts },
                    "finishReason": "STOP"
                }],
                "usageMetadata": usage,
                "modelVersion": model
            }))
            .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_gemini_upload(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    let count = state.upload_count.fetch_add(1, Ordering::Relaxed) + 1;
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();

    Json(json!({
        "file": {
            "name": format!("files/mock-{count}"),
            "uri": format!("https://files.mock/mock-{count}"),
            "mimeType": mime_type,
            "sizeBytes": body.len().to_string()
        }
    }))
    .into_response()
}
