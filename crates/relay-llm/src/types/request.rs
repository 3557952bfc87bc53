use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::ToolDefinition;

/// Parameters controlling text generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Extended reasoning toggle
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Whether reasoning output should be surfaced
    pub enabled: bool,
}

/// Normalized chat request handed to a provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier, optionally prefixed with `provider/`
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// System prompt, sent ahead of every other message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Generation parameters
    #[serde(default, flatten)]
    pub params: CompletionParams,
    /// Tool definitions available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Reasoning toggle; absent means the provider decides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Opaque provider-specific fields merged into the upstream body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_body: Option<serde_json::Value>,
}

impl ChatRequest {
    /// Whether reasoning output was explicitly disabled
    pub fn thinking_disabled(&self) -> bool {
        self.thinking.is_some_and(|t| !t.enabled)
    }
}
