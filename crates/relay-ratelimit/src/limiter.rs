use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use relay_config::{ProviderRateLimit, parse_duration};
use tokio::time::Instant;

use crate::error::RateLimitError;
use crate::retry::{RetryPolicy, Retryable};

/// Spread applied when several callers wake for the same replenished cell
const ADMISSION_JITTER: Duration = Duration::from_millis(50);

/// Requests admitted per window for one limiter key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestQuota {
    /// Maximum requests per window
    pub requests: u32,
    /// Window duration
    pub window: Duration,
}

impl RequestQuota {
    /// Build from provider configuration
    pub fn from_config(config: &ProviderRateLimit) -> Result<Self, RateLimitError> {
        let window = parse_duration(&config.window).map_err(RateLimitError::Config)?;
        Ok(Self {
            requests: config.requests,
            window,
        })
    }

    fn to_governor(self) -> Result<Quota, RateLimitError> {
        if self.window.is_zero() {
            return Err(RateLimitError::Config("rate limit window must be > 0".to_owned()));
        }

        let burst =
            NonZeroU32::new(self.requests).ok_or_else(|| RateLimitError::Config("requests must be > 0".to_owned()))?;

        // Replenish one cell every window / requests
        let replenish_interval = self.window / self.requests;

        Quota::with_period(replenish_interval)
            .map(|quota| quota.allow_burst(burst))
            .ok_or_else(|| RateLimitError::Config("invalid rate limit period".to_owned()))
    }
}

/// Admission state for a single key
struct KeyState {
    /// Proactive quota, absent for unthrottled keys
    bucket: Option<DefaultDirectRateLimiter>,
    /// Reactive block deadline in milliseconds since the limiter origin
    blocked_until_ms: AtomicU64,
}

impl KeyState {
    fn new(bucket: Option<DefaultDirectRateLimiter>) -> Self {
        Self {
            bucket,
            blocked_until_ms: AtomicU64::new(0),
        }
    }
}

/// Process-wide limiter shared by every provider adapter
///
/// Combines a per-key request quota (GCRA via governor) with reactive blocks
/// raised when an upstream answers 429, and owns the retry policy applied to
/// call establishment.
pub struct ProviderLimiter {
    keys: DashMap<String, Arc<KeyState>>,
    retry: RetryPolicy,
    origin: Instant,
}

impl ProviderLimiter {
    /// Create a limiter with the given retry policy and no registered keys
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            keys: DashMap::new(),
            retry,
            origin: Instant::now(),
        }
    }

    /// Register a key with an optional request quota, replacing prior state
    pub fn register(&self, key: &str, quota: Option<RequestQuota>) -> Result<(), RateLimitError> {
        let bucket = quota
            .map(|q| q.to_governor().map(RateLimiter::direct))
            .transpose()?;

        self.keys.insert(key.to_owned(), Arc::new(KeyState::new(bucket)));
        Ok(())
    }

    fn state(&self, key: &str) -> Arc<KeyState> {
        if let Some(state) = self.keys.get(key) {
            return Arc::clone(&state);
        }

        let entry = self
            .keys
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(KeyState::new(None)));
        Arc::clone(&entry)
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Block every caller of `key` for `duration`
    ///
    /// Overlapping blocks keep the later deadline.
    pub fn block_for(&self, key: &str, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let until = self.now_ms().saturating_add(millis);
        self.state(key).blocked_until_ms.fetch_max(until, Ordering::AcqRel);

        tracing::warn!(key, block_ms = millis, "upstream blocked by rate limit");
    }

    /// Whether `key` is currently under a reactive block
    pub fn is_blocked(&self, key: &str) -> bool {
        self.state(key).blocked_until_ms.load(Ordering::Acquire) > self.now_ms()
    }

    /// Suspend while `key` is blocked
    ///
    /// Returns `true` if the caller had to wait.
    pub async fn wait_if_blocked(&self, key: &str) -> bool {
        let state = self.state(key);
        let mut waited = false;

        loop {
            let until = state.blocked_until_ms.load(Ordering::Acquire);
            let now = self.now_ms();
            if until <= now {
                return waited;
            }

            let remaining = Duration::from_millis(until - now);
            tracing::debug!(key, wait_ms = until - now, "waiting for upstream block to lift");
            tokio::time::sleep(remaining).await;
            waited = true;
        }
    }

    /// Consume one request from the key's quota, suspending until admitted
    pub async fn acquire(&self, key: &str) {
        let state = self.state(key);
        let Some(bucket) = &state.bucket else {
            return;
        };

        if bucket.check().is_err() {
            tracing::debug!(key, "request quota exhausted, waiting for admission");
            bucket.until_ready_with_jitter(Jitter::up_to(ADMISSION_JITTER)).await;
        }
    }

    /// Run `call` under the key's quota, retrying transient failures
    ///
    /// Attempts are strictly sequential. Each attempt consumes quota; retries
    /// additionally honor reactive blocks, which a failure carrying a
    /// `retry_after` raises for every caller of the key. A `retry_after` is
    /// never shorter than the backoff for that attempt, and one longer than
    /// the policy's `max_retry_after` ends the call. Non-transient failures
    /// and the failure of the last permitted attempt are returned as-is.
    pub async fn execute_with_retry<T, E, F, Fut>(&self, key: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                self.wait_if_blocked(key).await;
            }
            self.acquire(key).await;

            let error = match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(key, attempt, "upstream call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::debug!(key, error = %error, "non-transient upstream failure, not retrying");
                return Err(error);
            }

            if attempt >= self.retry.max_retries {
                tracing::warn!(key, attempts = attempt + 1, error = %error, "upstream retries exhausted");
                return Err(error);
            }

            let backoff = self.retry.delay_for(attempt);

            if let Some(after) = error.retry_after() {
                if after > self.retry.max_retry_after {
                    tracing::warn!(
                        key,
                        retry_after_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "upstream retry-after exceeds ceiling, not retrying"
                    );
                    return Err(error);
                }

                // Never retry sooner than the backoff schedule
                self.block_for(key, after.max(backoff));
            } else {
                tracing::warn!(
                    key,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "transient upstream failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            }

            attempt += 1;
        }
    }
}
