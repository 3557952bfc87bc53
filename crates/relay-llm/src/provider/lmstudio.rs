//! LM Studio local inference server provider

use std::sync::Arc;

use async_trait::async_trait;
use relay_config::LlmProviderConfig;
use relay_ratelimit::{ProviderLimiter, RequestQuota};
use secrecy::{ExposeSecret, SecretString};

use super::{Provider, ProviderCapabilities};
use crate::convert::openai::chat_payload;
use crate::error::LlmError;
use crate::executor::RateLimitedExecutor;
use crate::protocol::openai::OpenAiRequest;
use crate::types::ChatRequest;
use crate::upstream::{ChunkStream, HttpUpstream, Upstream};

/// Default LM Studio server URL
const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

/// Credential sent when none is configured; LM Studio accepts any key
pub const PLACEHOLDER_API_KEY: &str = "lm-studio";

/// LM Studio provider
///
/// Speaks the OpenAI chat protocol. The request's extension payload is never
/// forwarded and `reasoning_content` deltas become thinking blocks.
pub struct LmStudioProvider {
    name: String,
    reasoning: bool,
    executor: RateLimitedExecutor,
}

impl LmStudioProvider {
    /// Create from provider configuration, registering its quota with `limiter`
    pub fn new(name: String, config: &LlmProviderConfig, limiter: Arc<ProviderLimiter>) -> Result<Self, LlmError> {
        let base_url = super::base_url_or(config.base_url.as_ref(), DEFAULT_BASE_URL)?;
        let api_key = resolve_api_key(config.api_key.as_ref());
        let upstream = HttpUpstream::new(name.clone(), &base_url, Some(api_key), &config.timeouts)?;

        Self::with_upstream(name, config, Arc::new(upstream), limiter)
    }

    /// Create with a caller-supplied transport
    pub fn with_upstream(
        name: String,
        config: &LlmProviderConfig,
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
            reasoning: config.capabilities.reasoning,
        })
    }
}

/// Configured credential, or the placeholder when absent or empty
pub fn resolve_api_key(configured: Option<&SecretString>) -> SecretString {
    match configured {
        Some(key) if !key.expose_secret().is_empty() => key.clone(),
        _ => SecretString::from(PLACEHOLDER_API_KEY.to_owned()),
    }
}

#[async_trait]
impl Provider for LmStudioProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            reasoning: self.reasoning,
            extension_payload: false,
        }
    }

    fn build_payload(&self, request: &ChatRequest) -> OpenAiRequest {
        if request.extra_body.is_some() {
            tracing::debug!(provider = %self.name, "LM Studio ignores the extension payload");
        }

        chat_payload(request)
    }

    async fn execute(&self, payload: &OpenAiRequest) -> Result<ChunkStream, LlmError> {
        self.executor.execute(payload).await
    }
}
