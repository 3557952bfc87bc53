use serde::Deserialize;

/// Retry policy for upstream call establishment
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (e.g. "500ms")
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: String,
    /// Upper bound for any single delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,
    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (0.0 to 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Longest upstream `Retry-After` honored before giving up
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_retry_after: default_max_retry_after(),
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> String {
    "500ms".to_owned()
}

fn default_max_backoff() -> String {
    "10s".to_owned()
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> f64 {
    0.1
}

fn default_max_retry_after() -> String {
    "60s".to_owned()
}
