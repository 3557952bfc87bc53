use std::path::Path;

use crate::{Config, parse_duration};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        tracing::debug!(providers = config.llm.providers.len(), "configuration loaded");

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, or a provider's URL,
    /// quota, timeouts, or the retry policy are invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        for (name, provider) in &self.llm.providers {
            if let Some(url) = &provider.base_url
                && !matches!(url.scheme(), "http" | "https")
            {
                anyhow::bail!("provider '{name}' base_url must use http or https, got '{}'", url.scheme());
            }

            if let Some(rate_limit) = &provider.rate_limit {
                if rate_limit.requests == 0 {
                    anyhow::bail!("provider '{name}' rate_limit.requests must be greater than 0");
                }
                let window = parse_duration(&rate_limit.window).map_err(|e| anyhow::anyhow!("provider '{name}': {e}"))?;
                if window.is_zero() {
                    anyhow::bail!("provider '{name}' rate_limit.window must be greater than 0");
                }
            }

            for value in [&provider.timeouts.connect, &provider.timeouts.idle] {
                parse_duration(value).map_err(|e| anyhow::anyhow!("provider '{name}' timeouts: {e}"))?;
            }
        }

        let retry = &self.llm.retry;
        let initial = parse_duration(&retry.initial_backoff).map_err(|e| anyhow::anyhow!("llm.retry: {e}"))?;
        let max = parse_duration(&retry.max_backoff).map_err(|e| anyhow::anyhow!("llm.retry: {e}"))?;
        if initial > max {
            anyhow::bail!("llm.retry.initial_backoff must not exceed llm.retry.max_backoff");
        }
        parse_duration(&retry.max_retry_after).map_err(|e| anyhow::anyhow!("llm.retry.max_retry_after: {e}"))?;
        if retry.multiplier < 1.0 {
            anyhow::bail!("llm.retry.multiplier must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            anyhow::bail!("llm.retry.jitter must be between 0.0 and 1.0");
        }

        Ok(())
    }
}
