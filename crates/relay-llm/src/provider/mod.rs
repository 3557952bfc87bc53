//! Provider trait and implementations for OpenAI-compatible backends

pub mod lmstudio;
pub mod openai;

use async_trait::async_trait;
use url::Url;

use crate::error::LlmError;
use crate::protocol::openai::OpenAiRequest;
use crate::translate::{self, EventStream, StreamTranslator};
use crate::types::ChatRequest;
use crate::upstream::ChunkStream;

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    /// Whether reasoning deltas are surfaced as thinking blocks
    pub reasoning: bool,
    /// Whether the request's extension payload reaches the upstream
    pub extension_payload: bool,
}

/// Trait implemented by each LLM provider backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name, also its limiter key
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Build the upstream payload for `request`
    fn build_payload(&self, request: &ChatRequest) -> OpenAiRequest;

    /// Open the upstream call under the shared limiter
    async fn execute(&self, payload: &OpenAiRequest) -> Result<ChunkStream, LlmError>;

    /// Translate the upstream chunks of `request` into normalized events
    fn translate_stream(&self, request: &ChatRequest, chunks: ChunkStream) -> EventStream {
        let reasoning = self.capabilities().reasoning && !request.thinking_disabled();
        let translator = StreamTranslator::new(&request.model).with_reasoning(reasoning);
        translate::translate_stream(chunks, translator)
    }

    /// Build, execute and translate a streaming request
    async fn stream_response(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let payload = self.build_payload(request);
        let chunks = self.execute(&payload).await?;

        tracing::debug!(provider = %self.name(), model = %request.model, "upstream stream opened");

        Ok(self.translate_stream(request, chunks))
    }
}

/// Configured base URL, or the provider default when none is configured
///
/// Only `http` and `https` endpoints with a host are accepted.
fn base_url_or(configured: Option<&Url>, default: &str) -> Result<Url, LlmError> {
    let url = match configured {
        Some(url) => url.clone(),
        None => Url::parse(default).map_err(|e| LlmError::Config(format!("invalid default base URL: {e}")))?,
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LlmError::Config(format!(
            "base URL must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(LlmError::Config(format!("base URL '{url}' has no host")));
    }

    Ok(url)
}
