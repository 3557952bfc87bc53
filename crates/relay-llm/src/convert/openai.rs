//! Conversion between internal types and `OpenAI` wire format

use serde_json::{Map, Value};

use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage,
    OpenAiRequest, OpenAiStreamChunk, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{ChatRequest, Content, ContentPart, Message, RawChunk, Role, StopReason, ToolDefinition, Usage};

/// Body fields the payload sets itself; extension keys never shadow them
const RESERVED_FIELDS: &[&str] = &[
    "model",
    "messages",
    "temperature",
    "top_p",
    "max_tokens",
    "stop",
    "stream",
    "tools",
    "stream_options",
];

// -- Outbound: internal request -> OpenAI wire request --

/// Build the streaming chat payload shared by every OpenAI-compatible provider
///
/// Extension fields and stream options are left empty; providers decide
/// whether to add them.
pub fn chat_payload(request: &ChatRequest) -> OpenAiRequest {
    OpenAiRequest {
        model: request.model.clone(),
        messages: build_messages(request.system.as_deref(), &request.messages),
        temperature: request.params.temperature,
        top_p: request.params.top_p,
        max_tokens: request.params.max_tokens,
        stop: request.params.stop.clone(),
        stream: Some(true),
        tools: request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(Into::into).collect()),
        stream_options: None,
        extra: Map::new(),
    }
}

/// Build the outbound message list with exactly one leading system message
///
/// An explicit system prompt wins over system-role history entries, which
/// are dropped. Without one, system-role entries are joined into a single
/// leading message.
pub fn build_messages(system: Option<&str>, messages: &[Message]) -> Vec<OpenAiMessage> {
    let system = system.filter(|prompt| !prompt.is_empty());

    let mut folded = Vec::new();
    let mut outbound = Vec::with_capacity(messages.len() + 1);

    for message in messages {
        if message.role == Role::System {
            if system.is_none() {
                folded.push(message.content.as_text());
            }
            continue;
        }
        outbound.push(message.into());
    }

    if system.is_some() && messages.iter().any(|m| m.role == Role::System) {
        tracing::debug!("explicit system prompt supersedes system messages in history");
    }

    let leading = system.map(ToOwned::to_owned).or_else(|| {
        let joined = folded
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        (!joined.is_empty()).then_some(joined)
    });

    if let Some(prompt) = leading {
        outbound.insert(0, OpenAiMessage::system(prompt));
    }

    outbound
}

/// Extension fields to merge into the upstream body
///
/// Only JSON objects are accepted; keys naming a standard request field are
/// discarded.
pub fn extension_fields(extra_body: Option<&Value>) -> Map<String, Value> {
    match extra_body {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(fields)) => fields
            .iter()
            .filter(|(key, _)| {
                let reserved = RESERVED_FIELDS.contains(&key.as_str());
                if reserved {
                    tracing::debug!(field = %key, "ignoring extension field that shadows a request field");
                }
                !reserved
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Some(_) => {
            tracing::warn!("extension payload is not a JSON object, ignoring");
            Map::new()
        }
    }
}

impl OpenAiMessage {
    /// System message with plain text content
    pub fn system(prompt: String) -> Self {
        Self {
            role: Role::System.as_str().to_owned(),
            content: Some(OpenAiContent::Text(prompt)),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let content = match &msg.content {
            Content::Text(text) => OpenAiContent::Text(text.clone()),
            Content::Parts(parts) => OpenAiContent::Parts(parts.iter().map(Into::into).collect()),
        };

        Self {
            role: msg.role.as_str().to_owned(),
            content: Some(content),
            name: msg.name.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|tc| OpenAiToolCall {
                        id: tc.id.clone(),
                        tool_type: "function".to_owned(),
                        function: OpenAiFunctionCall {
                            name: tc.function.name.clone(),
                            arguments: tc.function.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ContentPart> for OpenAiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => Self::Text { text: text.clone() },
            ContentPart::Image { url, detail } => Self::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: url.clone(),
                    detail: detail.clone(),
                },
            },
        }
    }
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: tool.tool_type.clone(),
            function: OpenAiFunction {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                parameters: tool.function.parameters.clone(),
            },
        }
    }
}

// -- Inbound: OpenAI stream chunk -> raw chunk --

impl From<OpenAiStreamChunk> for RawChunk {
    fn from(chunk: OpenAiStreamChunk) -> Self {
        // Only the first choice is streamed
        let (text, reasoning, finish_reason) = chunk
            .choices
            .into_iter()
            .next()
            .map(|choice| (choice.delta.content, choice.delta.reasoning_content, choice.finish_reason))
            .unwrap_or_default();

        Self {
            text,
            reasoning,
            stop_reason: finish_reason.as_deref().map(StopReason::from_finish_reason),
            usage: chunk.usage.map(Into::into),
        }
    }
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}
