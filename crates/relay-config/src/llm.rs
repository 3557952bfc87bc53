use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::retry::RetryConfig;

/// Top-level LLM configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Upstream provider configurations keyed by name
    ///
    /// Order is preserved; the first provider serves models without a
    /// provider prefix.
    #[serde(default)]
    pub providers: IndexMap<String, LlmProviderConfig>,
    /// Retry policy applied to upstream call establishment
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Configuration for a single upstream provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmProviderConfig {
    /// Provider flavor
    #[serde(rename = "type")]
    pub provider_type: LlmProviderType,
    /// Credential sent as a bearer token (may be empty)
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override, e.g. `http://localhost:1234/v1`
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Request quota for this provider
    #[serde(default)]
    pub rate_limit: Option<ProviderRateLimit>,
    /// Capability flags
    #[serde(default)]
    pub capabilities: CapabilityFlags,
    /// Upstream timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Supported upstream flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderType {
    /// Generic OpenAI-compatible API
    Openai,
    /// LM Studio local inference server
    Lmstudio,
}

/// Per-provider capability flags
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityFlags {
    /// Forward the request's opaque extension payload (`extra_body`)
    #[serde(default)]
    pub extension_payload: bool,
    /// Surface `reasoning_content` deltas as thinking blocks
    #[serde(default = "default_true")]
    pub reasoning: bool,
}

impl Default for CapabilityFlags {
    fn default() -> Self {
        Self {
            extension_payload: false,
            reasoning: true,
        }
    }
}

/// Request quota for a provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderRateLimit {
    /// Maximum requests per window
    pub requests: u32,
    /// Window duration (e.g. "1m", "1h")
    pub window: String,
}

/// Upstream timeout configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Time allowed to establish the call and receive response headers
    #[serde(default = "default_connect_timeout")]
    pub connect: String,
    /// Longest allowed silence between two chunks once streaming began
    #[serde(default = "default_idle_timeout")]
    pub idle: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            idle: default_idle_timeout(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> String {
    "30s".to_owned()
}

fn default_idle_timeout() -> String {
    "120s".to_owned()
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn deserialize_lmstudio_provider() {
        let toml = r#"
            [providers.local]
            type = "lmstudio"
            api_key = ""
            base_url = "http://localhost:1234/v1"

            [providers.local.rate_limit]
            requests = 10
            window = "60s"
        "#;

        let config: LlmConfig = toml::from_str(toml).unwrap();
        let provider = &config.providers["local"];
        assert_eq!(provider.provider_type, LlmProviderType::Lmstudio);
        assert_eq!(provider.api_key.as_ref().unwrap().expose_secret(), "");
        assert_eq!(provider.base_url.as_ref().unwrap().as_str(), "http://localhost:1234/v1");

        let rate_limit = provider.rate_limit.as_ref().unwrap();
        assert_eq!(rate_limit.requests, 10);
        assert_eq!(rate_limit.window, "60s");
    }

    #[test]
    fn capability_defaults() {
        let toml = r#"
            [providers.nim]
            type = "openai"
        "#;

        let config: LlmConfig = toml::from_str(toml).unwrap();
        let provider = &config.providers["nim"];
        assert!(!provider.capabilities.extension_payload);
        assert!(provider.capabilities.reasoning);
        assert_eq!(provider.timeouts.connect, "30s");
        assert_eq!(provider.timeouts.idle, "120s");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn provider_order_is_preserved() {
        let toml = r#"
            [providers.second]
            type = "openai"

            [providers.first]
            type = "lmstudio"
        "#;

        let config: LlmConfig = toml::from_str(toml).unwrap();
        let names: Vec<_> = config.providers.keys().map(String::as_str).collect();
        assert_eq!(names, ["second", "first"]);
    }

    #[test]
    fn unknown_provider_type_is_rejected() {
        let toml = r#"
            [providers.other]
            type = "bedrock"
        "#;

        assert!(toml::from_str::<LlmConfig>(toml).is_err());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
            [providers.local]
            type = "lmstudio"
            extra_body = true
        "#;

        assert!(toml::from_str::<LlmConfig>(toml).is_err());
    }
}
