//! SSE framing of normalized events
//!
//! Every frame is `event: <name>\ndata: <json>\n\n`. JSON string encoding
//! escapes control characters, so delta text cannot end a frame early.

use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};

use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicStreamEvent};
use crate::translate::EventStream;
use crate::types::NormalizedEvent;

/// Encoded SSE frames of one response
pub type FrameStream = Pin<Box<dyn Stream<Item = String> + Send>>;

fn frame(name: &str, data: &str) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}

/// Encode one event as an SSE frame
pub fn serialize(event: &NormalizedEvent) -> String {
    let wire = AnthropicStreamEvent::from(event);
    let data = serde_json::to_string(&wire).unwrap_or_default();
    frame(event.name(), &data)
}

/// Encode an error as a terminal `error` frame
pub fn serialize_error(error: &LlmError) -> String {
    let body = AnthropicErrorResponse::from(error);
    let data = serde_json::to_string(&body).unwrap_or_default();
    frame("error", &data)
}

/// Encode an event stream
///
/// The first error becomes an `error` frame and ends the output, so an
/// error frame is never followed by `message_stop`.
pub fn encode_stream(events: EventStream) -> FrameStream {
    let frames = stream::unfold(Some(events), |events| async move {
        let mut events = events?;

        match events.next().await? {
            Ok(event) => Some((serialize(&event), Some(events))),
            Err(e) => {
                tracing::debug!(error = %e, "closing stream with error frame");
                Some((serialize_error(&e), None))
            }
        }
    });

    Box::pin(frames)
}
