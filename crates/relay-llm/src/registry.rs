//! Provider registry resolving request models to configured providers

use std::sync::Arc;

use indexmap::IndexMap;
use relay_config::{LlmConfig, LlmProviderType};
use relay_ratelimit::ProviderLimiter;

use crate::error::LlmError;
use crate::provider::Provider;
use crate::provider::lmstudio::LmStudioProvider;
use crate::provider::openai::OpenAiProvider;
use crate::translate::EventStream;
use crate::types::ChatRequest;

/// Configured providers in declaration order
///
/// A model named `provider/model` is routed to `provider` with the prefix
/// stripped; any other model goes to the first provider unchanged.
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build every configured provider around the shared limiter
    pub fn from_config(config: &LlmConfig, limiter: &Arc<ProviderLimiter>) -> Result<Self, LlmError> {
        let mut providers: IndexMap<String, Arc<dyn Provider>> = IndexMap::new();

        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match provider_config.provider_type {
                LlmProviderType::Lmstudio => Arc::new(LmStudioProvider::new(
                    name.clone(),
                    provider_config,
                    Arc::clone(limiter),
                )?),
                LlmProviderType::Openai => Arc::new(OpenAiProvider::new(
                    name.clone(),
                    provider_config,
                    Arc::clone(limiter),
                )?),
            };

            tracing::info!(provider = %name, provider_type = ?provider_config.provider_type, "registered provider");
            providers.insert(name.clone(), provider);
        }

        Ok(Self { providers })
    }

    /// Registry over already constructed providers, keyed by their names
    pub fn with_providers(providers: impl IntoIterator<Item = Arc<dyn Provider>>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|provider| (provider.name().to_owned(), provider))
                .collect(),
        }
    }

    /// Provider names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Pick the provider for `model` and the model name it should receive
    pub fn resolve<'a>(&self, model: &'a str) -> Result<(Arc<dyn Provider>, &'a str), LlmError> {
        if let Some((prefix, rest)) = model.split_once('/')
            && let Some(provider) = self.providers.get(prefix)
        {
            return Ok((Arc::clone(provider), rest));
        }

        self.providers
            .first()
            .map(|(_, provider)| (Arc::clone(provider), model))
            .ok_or_else(|| LlmError::ProviderNotFound {
                provider: model.to_owned(),
            })
    }

    /// Route `request` and stream its normalized events
    pub async fn stream_messages(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let (provider, model) = self.resolve(&request.model)?;

        tracing::debug!(provider = %provider.name(), model, "routing request");

        if model == request.model {
            provider.stream_response(request).await
        } else {
            let routed = ChatRequest {
                model: model.to_owned(),
                ..request.clone()
            };
            provider.stream_response(&routed).await
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use relay_config::LlmProviderConfig;
    use relay_ratelimit::RetryPolicy;

    use super::*;
    use crate::types::{CompletionParams, Message, NormalizedEvent, RawChunk, Role, StopReason};
    use crate::upstream::fake::FakeUpstream;

    fn lmstudio(name: &str, upstream: Arc<FakeUpstream>) -> Arc<dyn Provider> {
        let config: LlmProviderConfig = toml::from_str(r#"type = "lmstudio""#).unwrap();
        let limiter = Arc::new(ProviderLimiter::new(RetryPolicy::no_retry()));
        Arc::new(LmStudioProvider::with_upstream(name.to_owned(), &config, upstream, limiter).unwrap())
    }

    fn request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_owned(),
            messages: vec![Message::text(Role::User, "Hi")],
            system: None,
            params: CompletionParams::default(),
            tools: None,
            thinking: None,
            extra_body: None,
        }
    }

    #[test]
    fn prefix_selects_provider() {
        let registry = ProviderRegistry::with_providers([
            lmstudio("local", FakeUpstream::new(vec![])),
            lmstudio("lab", FakeUpstream::new(vec![])),
        ]);

        let (provider, model) = registry.resolve("lab/qwen3-8b").unwrap();
        assert_eq!(provider.name(), "lab");
        assert_eq!(model, "qwen3-8b");
    }

    #[test]
    fn unknown_prefix_falls_back_to_first_provider() {
        let registry = ProviderRegistry::with_providers([
            lmstudio("local", FakeUpstream::new(vec![])),
            lmstudio("lab", FakeUpstream::new(vec![])),
        ]);

        let (provider, model) = registry.resolve("qwen/qwen3-8b").unwrap();
        assert_eq!(provider.name(), "local");
        assert_eq!(model, "qwen/qwen3-8b");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["local", "lab"]);
    }

    #[test]
    fn empty_registry_has_no_provider() {
        let registry = ProviderRegistry::with_providers([]);
        assert!(matches!(
            registry.resolve("any"),
            Err(LlmError::ProviderNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn routed_model_reaches_upstream_without_prefix() {
        let upstream = FakeUpstream::new(vec![RawChunk::text("ok"), RawChunk::stop(StopReason::EndTurn)]);
        let registry = ProviderRegistry::with_providers([lmstudio("local", Arc::clone(&upstream))]);

        let events: Vec<_> = registry
            .stream_messages(&request("local/qwen3-8b"))
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(upstream.last_payload().unwrap()["model"], "qwen3-8b");
        assert!(matches!(
            &events[0],
            NormalizedEvent::MessageStart { model, .. } if model == "qwen3-8b"
        ));
    }
}
