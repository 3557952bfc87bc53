//! Process-wide upstream limiter for Relay
//!
//! One [`ProviderLimiter`] is built per process and shared by `Arc` with every
//! provider adapter. Each provider registers a key with an optional request
//! quota; admission decisions for different keys never contend on a common
//! lock.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod limiter;
mod retry;

pub use error::RateLimitError;
pub use limiter::{ProviderLimiter, RequestQuota};
pub use retry::{RetryPolicy, Retryable};

/// Create a shared limiter whose retry policy comes from configuration
pub fn create_provider_limiter(config: &relay_config::RetryConfig) -> Result<ProviderLimiter, RateLimitError> {
    Ok(ProviderLimiter::new(RetryPolicy::from_config(config)?))
}
