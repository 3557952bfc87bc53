//! Mock OpenAI-compatible backend for integration tests
//!
//! Streams canned `chat/completions` chunks and records what it received

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One streamed delta
#[derive(Debug, Clone)]
pub enum Delta {
    Content(&'static str),
    Reasoning(&'static str),
    /// Stop sending and hold the response open
    Stall,
}

/// A scripted failure returned before any stream is served
#[derive(Debug, Clone, Copy)]
pub struct Failure {
    pub status: StatusCode,
    pub retry_after: Option<u64>,
}

impl Failure {
    pub const fn status(status: StatusCode) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }

    pub const fn rate_limited(retry_after: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(retry_after),
        }
    }
}

/// Mock backend serving a fixed delta script
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    failures: Mutex<VecDeque<Failure>>,
    deltas: Vec<Delta>,
    last_request: Mutex<Option<Value>>,
    last_authorization: Mutex<Option<String>>,
    body_released: AtomicBool,
}

impl MockLlm {
    /// Start a mock that streams `deltas`
    pub async fn start(deltas: Vec<Delta>) -> anyhow::Result<Self> {
        Self::start_failing(deltas, Vec::new()).await
    }

    /// Start a mock that answers with `failures` before streaming `deltas`
    pub async fn start_failing(deltas: Vec<Delta>, failures: Vec<Failure>) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            failures: Mutex::new(failures.into()),
            deltas,
            last_request: Mutex::new(None),
            last_authorization: Mutex::new(None),
            body_released: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
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

    /// Base URL including `/v1`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent completion request
    pub fn last_request(&self) -> Option<Value> {
        self.state.last_request.lock().unwrap().clone()
    }

    /// `Authorization` header of the most recent completion request
    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }

    /// Whether a stalled response body was torn down by the server
    pub fn body_released(&self) -> bool {
        self.state.body_released.load(Ordering::SeqCst)
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);

    *state.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *state.last_request.lock().unwrap() = Some(body.clone());

    let failure = state.failures.lock().unwrap().pop_front();
    if let Some(failure) = failure {
        let error = Json(json!({
            "error": {
                "message": "mock server intentional failure",
                "type": "server_error"
            }
        }));

        return match failure.retry_after {
            Some(seconds) => (failure.status, [(header::RETRY_AFTER, seconds.to_string())], error).into_response(),
            None => (failure.status, error).into_response(),
        };
    }

    let model = body["model"].as_str().unwrap_or("mock-model").to_owned();
    let include_usage = body["stream_options"]["include_usage"].as_bool().unwrap_or(false);

    let (frames, stalled) = streaming_frames(&model, &state.deltas, include_usage);
    let frames = stream::iter(frames.into_iter().map(Ok::<_, Infallible>));

    let body = if stalled {
        Body::from_stream(ReleaseGuard {
            inner: frames.chain(stream::pending()).boxed(),
            state: Arc::clone(&state),
        })
    } else {
        Body::from_stream(frames)
    };

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// Response body that records when the server drops it
struct ReleaseGuard {
    inner: BoxStream<'static, Result<String, Infallible>>,
    state: Arc<MockLlmState>,
}

impl Stream for ReleaseGuard {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.state.body_released.store(true, Ordering::SeqCst);
    }
}

/// SSE frames for the delta script, and whether the script stalls
fn streaming_frames(model: &str, deltas: &[Delta], include_usage: bool) -> (Vec<String>, bool) {
    let chunk = |delta: Value, finish_reason: Option<&str>| {
        json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000u64,
            "model": model,
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        })
    };

    let mut events = vec![chunk(json!({"role": "assistant"}), None)];
    for delta in deltas {
        match delta {
            Delta::Content(text) => events.push(chunk(json!({"content": text}), None)),
            Delta::Reasoning(text) => events.push(chunk(json!({"reasoning_content": text}), None)),
            Delta::Stall => {
                let frames = events.iter().map(|event| format!("data: {event}\n\n")).collect();
                return (frames, true);
            }
        }
    }
    events.push(chunk(json!({}), Some("stop")));

    if include_usage {
        events.push(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000u64,
            "model": model,
            "choices": [],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        }));
    }

    let mut frames: Vec<String> = events.iter().map(|event| format!("data: {event}\n\n")).collect();
    frames.push("data: [DONE]\n\n".to_owned());
    (frames, false)
}
