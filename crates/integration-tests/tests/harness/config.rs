//! Configuration builder for integration tests

use relay_config::Config;

/// Builds TOML configurations pointing providers at mock backends
pub struct ConfigBuilder {
    providers: Vec<String>,
    retry: String,
}

impl ConfigBuilder {
    /// Create a builder with fast retries and no providers
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            retry: retry_section(2, "10ms"),
        }
    }

    /// Add an LM Studio provider without a credential
    pub fn with_lmstudio_provider(mut self, name: &str, base_url: &str) -> Self {
        self.providers.push(format!(
            r#"
            [llm.providers.{name}]
            type = "lmstudio"
            base_url = "{base_url}"

            [llm.providers.{name}.rate_limit]
            requests = 10
            window = "60s"
            "#
        ));
        self
    }

    /// Add an OpenAI-compatible provider that forwards extension fields
    pub fn with_openai_provider(mut self, name: &str, base_url: &str) -> Self {
        self.providers.push(format!(
            r#"
            [llm.providers.{name}]
            type = "openai"
            api_key = "test-key"
            base_url = "{base_url}"

            [llm.providers.{name}.capabilities]
            extension_payload = true
            "#
        ));
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry = retry_section(max_retries, "10ms");
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        let raw = format!("{}\n{}", self.retry, self.providers.join("\n"));
        Config::from_toml(&raw).expect("valid test configuration")
    }
}

fn retry_section(max_retries: u32, initial_backoff: &str) -> String {
    format!(
        r#"
        [llm.retry]
        max_retries = {max_retries}
        initial_backoff = "{initial_backoff}"
        max_backoff = "50ms"
        jitter = 0.0
        "#
    )
}
