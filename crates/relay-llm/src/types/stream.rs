use serde::{Deserialize, Serialize};

/// Token usage reported by the upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of generation
    EndTurn,
    /// Hit the `max_tokens` limit
    MaxTokens,
    /// Model decided to call a tool
    ToolUse,
}

impl StopReason {
    /// Map an `OpenAI` finish reason
    ///
    /// Unknown reasons still end the stream, as a natural end of turn.
    pub fn from_finish_reason(reason: &str) -> Self {
        match reason {
            "length" | "max_tokens" => Self::MaxTokens,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolUse,
            _ => Self::EndTurn,
        }
    }

    /// Wire name of the stop reason
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::ToolUse => "tool_use",
        }
    }
}

/// One decoded upstream chunk
///
/// Any combination of fields may be populated; a chunk with none is a
/// heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChunk {
    /// Visible answer fragment
    pub text: Option<String>,
    /// Reasoning fragment
    pub reasoning: Option<String>,
    /// Stop reason, present on the final chunk
    pub stop_reason: Option<StopReason>,
    /// Usage summary
    pub usage: Option<Usage>,
}

impl RawChunk {
    /// Chunk carrying only a text fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Chunk carrying only a reasoning fragment
    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: Some(reasoning.into()),
            ..Self::default()
        }
    }

    /// Chunk carrying only a stop reason
    pub fn stop(reason: StopReason) -> Self {
        Self {
            stop_reason: Some(reason),
            ..Self::default()
        }
    }

    /// Attach a usage summary
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Whether nothing is populated
    pub const fn is_heartbeat(&self) -> bool {
        self.text.is_none() && self.reasoning.is_none() && self.stop_reason.is_none() && self.usage.is_none()
    }

    /// Whether the chunk only reports usage
    pub const fn is_usage_only(&self) -> bool {
        self.usage.is_some() && self.text.is_none() && self.reasoning.is_none() && self.stop_reason.is_none()
    }
}

/// Content block modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Visible answer
    Text,
    /// Model reasoning
    Thinking,
}

/// Provider-agnostic streamed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// First event of every stream
    MessageStart {
        /// Message identifier
        id: String,
        /// Model the request addressed
        model: String,
    },
    /// A content block opened
    ContentBlockStart {
        /// Block index, unique within the stream
        index: u32,
        /// Block modality
        kind: BlockKind,
    },
    /// Fragment appended to the open block
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// Block modality
        kind: BlockKind,
        /// Fragment text
        text: String,
    },
    /// The open block closed
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Final metadata
    MessageDelta {
        /// Latest usage summary seen
        usage: Option<Usage>,
        /// Why generation ended
        stop_reason: Option<StopReason>,
    },
    /// Last event of every complete stream
    MessageStop,
}

impl NormalizedEvent {
    /// Outbound event name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
        }
    }
}
