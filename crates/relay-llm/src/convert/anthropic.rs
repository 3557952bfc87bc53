//! Conversion from normalized events to Anthropic streaming wire format

use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicErrorDetail, AnthropicErrorResponse, AnthropicMessageDelta, AnthropicStreamContentBlock,
    AnthropicStreamDelta, AnthropicStreamEvent, AnthropicStreamMessage, AnthropicUsage,
};
use crate::types::{BlockKind, NormalizedEvent, Usage};

impl From<&NormalizedEvent> for AnthropicStreamEvent {
    fn from(event: &NormalizedEvent) -> Self {
        match event {
            NormalizedEvent::MessageStart { id, model } => Self::MessageStart {
                message: AnthropicStreamMessage {
                    id: id.clone(),
                    message_type: "message".to_owned(),
                    role: "assistant".to_owned(),
                    content: Vec::new(),
                    model: model.clone(),
                    stop_reason: None,
                    usage: Some(AnthropicUsage {
                        input_tokens: 0,
                        output_tokens: 0,
                    }),
                },
            },
            NormalizedEvent::ContentBlockStart { index, kind } => Self::ContentBlockStart {
                index: *index,
                content_block: match kind {
                    BlockKind::Text => AnthropicStreamContentBlock::Text { text: String::new() },
                    BlockKind::Thinking => AnthropicStreamContentBlock::Thinking {
                        thinking: String::new(),
                    },
                },
            },
            NormalizedEvent::ContentBlockDelta { index, kind, text } => Self::ContentBlockDelta {
                index: *index,
                delta: match kind {
                    BlockKind::Text => AnthropicStreamDelta::TextDelta { text: text.clone() },
                    BlockKind::Thinking => AnthropicStreamDelta::ThinkingDelta { thinking: text.clone() },
                },
            },
            NormalizedEvent::ContentBlockStop { index } => Self::ContentBlockStop { index: *index },
            NormalizedEvent::MessageDelta { usage, stop_reason } => Self::MessageDelta {
                delta: AnthropicMessageDelta {
                    stop_reason: stop_reason.map(|reason| reason.as_str().to_owned()),
                    stop_sequence: None,
                },
                usage: usage.map(Into::into),
            },
            NormalizedEvent::MessageStop => Self::MessageStop,
        }
    }
}

impl From<Usage> for AnthropicUsage {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

impl From<&LlmError> for AnthropicErrorResponse {
    fn from(error: &LlmError) -> Self {
        Self {
            error_type: "error".to_owned(),
            error: AnthropicErrorDetail {
                error_type: error.error_type().to_owned(),
                message: error.client_message(),
            },
        }
    }
}
