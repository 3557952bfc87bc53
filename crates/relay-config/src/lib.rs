#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod retry;
pub mod telemetry;

use serde::Deserialize;

pub use env::EnvExpansionError;
pub use llm::*;
pub use retry::RetryConfig;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level Relay configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Upstream LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Parse a human-readable duration such as `"500ms"` or `"1m"`
///
/// # Errors
///
/// Returns a message naming the offending input when it cannot be parsed
pub fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    duration_str::parse(s).map_err(|e| format!("invalid duration '{s}': {e}"))
}
