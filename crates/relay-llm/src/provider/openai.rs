//! Generic OpenAI-compatible provider implementation

use std::sync::Arc;

use async_trait::async_trait;
use relay_config::{CapabilityFlags, LlmProviderConfig};
use relay_ratelimit::{ProviderLimiter, RequestQuota};
use url::Url;

use super::{Provider, ProviderCapabilities};
use crate::convert::openai::{chat_payload, extension_fields};
use crate::error::LlmError;
use crate::executor::RateLimitedExecutor;
use crate::protocol::openai::{OpenAiRequest, OpenAiStreamOptions};
use crate::types::ChatRequest;
use crate::upstream::{ChunkStream, HttpUpstream, Upstream};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Whether the provider is the canonical `OpenAI` API (vs a compatible third-party)
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    name: String,
    capabilities: CapabilityFlags,
    canonical: bool,
    executor: RateLimitedExecutor,
}

impl OpenAiProvider {
    /// Create from provider configuration, registering its quota with `limiter`
    pub fn new(name: String, config: &LlmProviderConfig, limiter: Arc<ProviderLimiter>) -> Result<Self, LlmError> {
        let base_url = super::base_url_or(config.base_url.as_ref(), DEFAULT_BASE_URL)?;
        let upstream = HttpUpstream::new(name.clone(), &base_url, config.api_key.clone(), &config.timeouts)?;

        Self::with_upstream(name, config, &base_url, Arc::new(upstream), limiter)
    }

    /// Create with a caller-supplied transport
    pub fn with_upstream(
        name: String,
        config: &LlmProviderConfig,
        base_url: &Url,
        upstream: Arc<dyn Upstream>,
        limiter: Arc<ProviderLimiter>,
    ) -> Result<Self, LlmError> {
        let quota = config
            .rate_limit
            .as_ref()
            .map(RequestQuota::from_config)
            .transpose()?;
        limiter.register(&name, quota)?;

        Ok(Self {
            executor: RateLimitedExecutor::new(name.clone(), upstream, limiter),
            name,
            capabilities: config.capabilities.clone(),
            canonical: is_canonical_openai(base_url),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            reasoning: self.capabilities.reasoning,
            extension_payload: self.capabilities.extension_payload,
        }
    }

    fn build_payload(&self, request: &ChatRequest) -> OpenAiRequest {
        let mut payload = chat_payload(request);

        if self.capabilities.extension_payload {
            payload.extra = extension_fields(request.extra_body.as_ref());
        } else if request.extra_body.is_some() {
            tracing::debug!(provider = %self.name, "extension payload not enabled, dropping");
        }

        // Only send stream_options to canonical OpenAI; many compatible APIs
        // reject the unsupported parameter
        if self.canonical {
            payload.stream_options = Some(OpenAiStreamOptions { include_usage: true });
        }

        payload
    }

    async fn execute(&self, payload: &OpenAiRequest) -> Result<ChunkStream, LlmError> {
        self.executor.execute(payload).await
    }
}

#[cfg(test)]
mod tests {
    use relay_ratelimit::RetryPolicy;
    use serde_json::json;

    use super::*;
    use crate::types::{CompletionParams, Message, Role};
    use crate::upstream::fake::FakeUpstream;

    fn provider(toml_config: &str) -> OpenAiProvider {
        let config: LlmProviderConfig = toml::from_str(toml_config).unwrap();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).unwrap());
        let limiter = Arc::new(ProviderLimiter::new(RetryPolicy::no_retry()));

        OpenAiProvider::with_upstream("openai".to_owned(), &config, &base_url, FakeUpstream::new(vec![]), limiter)
            .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_owned(),
            messages: vec![Message::text(Role::User, "Hi")],
            system: None,
            params: CompletionParams::default(),
            tools: None,
            thinking: None,
            extra_body: Some(json!({"reasoning_effort": "low"})),
        }
    }

    #[test]
    fn extension_payload_requires_capability() {
        let disabled = provider(
            r#"
            type = "openai"
            base_url = "http://localhost:8000/v1"
        "#,
        );
        let payload = serde_json::to_value(disabled.build_payload(&request())).unwrap();
        assert!(payload.get("reasoning_effort").is_none());

        let enabled = provider(
            r#"
            type = "openai"
            base_url = "http://localhost:8000/v1"

            [capabilities]
            extension_payload = true
        "#,
        );
        let payload = serde_json::to_value(enabled.build_payload(&request())).unwrap();
        assert_eq!(payload["reasoning_effort"], "low");
        assert!(payload.get("extra_body").is_none());
    }

    #[test]
    fn stream_options_only_for_canonical_host() {
        let canonical = provider(r#"type = "openai""#);
        let payload = serde_json::to_value(canonical.build_payload(&request())).unwrap();
        assert_eq!(payload["stream_options"]["include_usage"], true);

        let compatible = provider(
            r#"
            type = "openai"
            base_url = "https://integrate.api.nvidia.com/v1"
        "#,
        );
        let payload = serde_json::to_value(compatible.build_payload(&request())).unwrap();
        assert!(payload.get("stream_options").is_none());
    }

    #[test]
    fn canonical_host_detection() {
        assert!(is_canonical_openai(&Url::parse("https://api.openai.com/v1").unwrap()));
        assert!(!is_canonical_openai(&Url::parse("http://localhost:1234/v1").unwrap()));
    }
}
