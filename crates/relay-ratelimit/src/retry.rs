use std::time::Duration;

use rand::Rng;
use relay_config::{RetryConfig, parse_duration};

use crate::error::RateLimitError;

/// Classification of a failed upstream attempt
pub trait Retryable {
    /// Whether another attempt may succeed (network error, 5xx, timeout, 429)
    fn is_transient(&self) -> bool;

    /// Upstream-mandated delay before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Random spread as a fraction of the delay
    pub jitter: f64,
    /// Longest upstream-mandated delay worth waiting for
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Build from configuration
    pub fn from_config(config: &RetryConfig) -> Result<Self, RateLimitError> {
        let initial_backoff = parse_duration(&config.initial_backoff).map_err(RateLimitError::Config)?;
        let max_backoff = parse_duration(&config.max_backoff).map_err(RateLimitError::Config)?;
        let max_retry_after = parse_duration(&config.max_retry_after).map_err(RateLimitError::Config)?;

        Ok(Self {
            max_retries: config.max_retries,
            initial_backoff,
            max_backoff,
            multiplier: config.multiplier.max(1.0),
            jitter: config.jitter.clamp(0.0, 1.0),
            max_retry_after,
        })
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            capped + rand::rng().random_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }
}
