//! Transport seam between an adapter and its upstream endpoint

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, stream};
use relay_config::{TimeoutConfig, parse_duration};
use reqwest::Client;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::LlmError;
use crate::protocol::openai::{OpenAiErrorResponse, OpenAiRequest, OpenAiStreamChunk};
use crate::types::RawChunk;

/// Chunks of one upstream call, in network order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<RawChunk, LlmError>> + Send>>;

/// Something that can open a streaming chat call
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Establish the call and return its chunk sequence
    ///
    /// Errors returned here happened before any chunk arrived and may be
    /// retried; errors inside the stream may not.
    async fn open(&self, payload: &OpenAiRequest) -> Result<ChunkStream, LlmError>;
}

/// HTTP transport for OpenAI-compatible `chat/completions` endpoints
pub struct HttpUpstream {
    provider: String,
    client: Client,
    completions_url: String,
    api_key: Option<SecretString>,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl HttpUpstream {
    /// Create a transport rooted at `base_url`
    pub fn new(
        provider: impl Into<String>,
        base_url: &Url,
        api_key: Option<SecretString>,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, LlmError> {
        let connect_timeout = parse_duration(&timeouts.connect).map_err(LlmError::Config)?;
        let idle_timeout = parse_duration(&timeouts.idle).map_err(LlmError::Config)?;
        let base = base_url.as_str().trim_end_matches('/');

        Ok(Self {
            provider: provider.into(),
            client: Client::new(),
            completions_url: format!("{base}/chat/completions"),
            api_key,
            connect_timeout,
            idle_timeout,
        })
    }

    /// Endpoint receiving chat requests
    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn open(&self, payload: &OpenAiRequest) -> Result<ChunkStream, LlmError> {
        let mut builder = self.client.post(&self.completions_url).json(payload);

        if let Some(key) = self
            .api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|key| !key.is_empty())
        {
            builder = builder.bearer_auth(key);
        }

        let response = match tokio::time::timeout(self.connect_timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(provider = %self.provider, error = %e, "upstream request failed");
                return Err(LlmError::Upstream(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    provider = %self.provider,
                    timeout_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                    "upstream did not respond in time"
                );
                return Err(LlmError::Timeout(self.connect_timeout));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.provider, status = %status, "upstream returned error");
            return Err(LlmError::from_status(status, retry_after, &upstream_error_message(&body)));
        }

        let chunks = decode_event_stream(response.bytes_stream(), self.idle_timeout);

        let include_usage = payload
            .stream_options
            .as_ref()
            .is_some_and(|options| options.include_usage);

        Ok(if include_usage {
            hold_stop_for_usage(chunks)
        } else {
            chunks
        })
    }
}

/// Outcome of decoding one SSE `data` field
#[derive(Debug, PartialEq, Eq)]
enum Decoded {
    Chunk(RawChunk),
    Done,
    Skip,
}

fn decode_data(data: &str) -> Decoded {
    let data = data.trim();
    if data.is_empty() {
        return Decoded::Skip;
    }
    if data == "[DONE]" {
        return Decoded::Done;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => Decoded::Chunk(chunk.into()),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
            Decoded::Skip
        }
    }
}

/// Decode an SSE byte stream into raw chunks
///
/// The stream ends at `[DONE]` or end of body. A transport failure or more
/// than `idle_timeout` of silence ends it with an error item.
pub fn decode_event_stream<S>(bytes: S, idle_timeout: Duration) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let events = Box::pin(bytes.eventsource());

    let chunks = stream::unfold(Some(events), move |events| async move {
        let mut events = events?;

        loop {
            let Ok(next) = tokio::time::timeout(idle_timeout, events.next()).await else {
                let error = LlmError::Streaming(format!("no data from upstream for {idle_timeout:?}"));
                return Some((Err(error), None));
            };

            match next {
                None => return None,
                Some(Err(e)) => return Some((Err(LlmError::Streaming(e.to_string())), None)),
                Some(Ok(event)) => match decode_data(&event.data) {
                    Decoded::Chunk(chunk) => return Some((Ok(chunk), Some(events))),
                    Decoded::Done => return None,
                    Decoded::Skip => {}
                },
            }
        }
    });

    Box::pin(chunks)
}

/// Delay a usage-less stop chunk until the trailing usage chunk arrives
///
/// With `include_usage`, `OpenAI` reports usage in a separate chunk after the
/// one carrying `finish_reason`; merging them keeps the stop chunk final.
/// Only a usage-only chunk is merged. Anything else after the stop ends the
/// stream with the held stop as is.
pub fn hold_stop_for_usage(chunks: ChunkStream) -> ChunkStream {
    let merged = stream::unfold(Some(chunks), |chunks| async move {
        let mut chunks = chunks?;
        let mut held: Option<RawChunk> = None;

        loop {
            let next = chunks.next().await;

            match (held.take(), next) {
                (None, Some(Ok(chunk))) if chunk.stop_reason.is_some() && chunk.usage.is_none() => {
                    held = Some(chunk);
                }
                (None, Some(item)) => return Some((item, Some(chunks))),
                (None, None) => return None,
                (Some(mut stop), Some(Ok(chunk))) if chunk.is_usage_only() => {
                    stop.usage = chunk.usage;
                    return Some((Ok(stop), None));
                }
                (Some(stop), Some(Ok(chunk))) if chunk.is_heartbeat() => held = Some(stop),
                (Some(stop), Some(Ok(_))) => {
                    tracing::debug!("upstream sent content after stop chunk, finishing without usage");
                    return Some((Ok(stop), None));
                }
                (Some(stop), Some(Err(e))) => {
                    tracing::debug!(error = %e, "upstream failed after stop chunk, finishing without usage");
                    return Some((Ok(stop), None));
                }
                (Some(stop), None) => return Some((Ok(stop), None)),
            }
        }
    });

    Box::pin(merged)
}

/// Parse a delay-seconds `Retry-After` header
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;

    match value.trim().parse::<u64>() {
        Ok(seconds) => Some(Duration::from_secs(seconds)),
        Err(_) => {
            tracing::debug!(value, "ignoring non-numeric Retry-After");
            None
        }
    }
}

/// Extract the human-readable message from an upstream error body
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<OpenAiErrorResponse>(body).map_or_else(|_| body.to_owned(), |r| r.error.message)
}


#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::types::{StopReason, Usage};

    fn sse(frames: &[&str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let body: String = frames.iter().map(|f| format!("data: {f}\n\n")).collect();
        stream::iter(vec![Ok(Bytes::from(body))])
    }

    async fn collect(chunks: ChunkStream) -> Vec<Result<RawChunk, LlmError>> {
        chunks.collect().await
    }

    #[test]
    fn done_sentinel_ends_stream() {
        assert_eq!(decode_data("[DONE]"), Decoded::Done);
        assert_eq!(decode_data("  [DONE]  "), Decoded::Done);
    }

    #[test]
    fn garbage_is_skipped() {
        assert_eq!(decode_data("{not json"), Decoded::Skip);
        assert_eq!(decode_data(""), Decoded::Skip);
    }

    #[tokio::test]
    async fn decodes_chunks_until_done() {
        let bytes = sse(&[
            r#"{"choices":[{"index":0,"delta":{"content":"Hello"}}]}"#,
            "{broken",
            r#"{"choices":[{"index":0,"delta":{"content":" World"}}]}"#,
            "[DONE]",
            r#"{"choices":[{"index":0,"delta":{"content":"ignored"}}]}"#,
        ]);

        let chunks = collect(decode_event_stream(bytes, Duration::from_secs(5))).await;
        let texts: Vec<_> = chunks
            .into_iter()
            .map(|c| c.unwrap().text.unwrap_or_default())
            .collect();

        assert_eq!(texts, vec!["Hello", " World"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_upstream_ends_with_stream_error() {
        let bytes = sse(&[r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#]).chain(stream::pending());

        let chunks = collect(decode_event_stream(bytes, Duration::from_secs(1))).await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(chunks[1], Err(LlmError::Streaming(_))));
    }

    #[tokio::test]
    async fn stop_chunk_absorbs_trailing_usage() {
        let usage = Usage {
            prompt_tokens: 4,
            completion_tokens: 10,
        };
        let upstream: ChunkStream = Box::pin(stream::iter(vec![
            Ok::<_, LlmError>(RawChunk::text("Hi")),
            Ok(RawChunk::stop(StopReason::EndTurn)),
            Ok(RawChunk::default().with_usage(usage)),
        ]));

        let chunks: Vec<_> = collect(hold_stop_for_usage(upstream))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].stop_reason, Some(StopReason::EndTurn));
        assert_eq!(chunks[1].usage, Some(usage));
    }

    #[tokio::test]
    async fn held_stop_is_released_at_end_of_stream() {
        let upstream: ChunkStream = Box::pin(stream::iter(vec![Ok::<_, LlmError>(RawChunk::stop(
            StopReason::MaxTokens,
        ))]));

        let chunks = collect(hold_stop_for_usage(upstream)).await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].as_ref().unwrap().usage.is_none());
    }

    #[tokio::test]
    async fn content_after_stop_is_not_merged_as_usage() {
        let usage = Usage {
            prompt_tokens: 4,
            completion_tokens: 10,
        };
        let upstream: ChunkStream = Box::pin(stream::iter(vec![
            Ok::<_, LlmError>(RawChunk::stop(StopReason::EndTurn)),
            Ok(RawChunk::default()),
            Ok(RawChunk::text("late").with_usage(usage)),
            Ok(RawChunk::default().with_usage(usage)),
        ]));

        let chunks: Vec<_> = collect(hold_stop_for_usage(upstream))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].stop_reason, Some(StopReason::EndTurn));
        assert!(chunks[0].usage.is_none());
        assert!(chunks[0].text.is_none());
    }

    #[test]
    fn retry_after_seconds_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"error":{"message":"model not loaded","type":"invalid_request_error"}}"#;
        assert_eq!(upstream_error_message(body), "model not loaded");
        assert_eq!(upstream_error_message("plain failure"), "plain failure");
    }

    #[test]
    fn completions_url_joins_base() {
        let base = Url::parse("http://localhost:1234/v1/").unwrap();
        let upstream = HttpUpstream::new("local", &base, None, &TimeoutConfig::default()).unwrap();
        assert_eq!(upstream.completions_url(), "http://localhost:1234/v1/chat/completions");
    }
}
