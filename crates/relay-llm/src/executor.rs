//! Rate-limited execution of upstream calls

use std::sync::Arc;

use relay_ratelimit::ProviderLimiter;

use crate::error::LlmError;
use crate::protocol::openai::OpenAiRequest;
use crate::upstream::{ChunkStream, Upstream};

/// Opens upstream calls under the shared limiter
///
/// Retries cover call establishment only. Once a chunk stream is returned,
/// its failures belong to the caller.
pub struct RateLimitedExecutor {
    key: String,
    upstream: Arc<dyn Upstream>,
    limiter: Arc<ProviderLimiter>,
}

impl RateLimitedExecutor {
    /// Executor admitting calls under limiter key `key`
    pub fn new(key: impl Into<String>, upstream: Arc<dyn Upstream>, limiter: Arc<ProviderLimiter>) -> Self {
        Self {
            key: key.into(),
            upstream,
            limiter,
        }
    }

    /// Open a streaming call for `payload`
    pub async fn execute(&self, payload: &OpenAiRequest) -> Result<ChunkStream, LlmError> {
        if self.limiter.wait_if_blocked(&self.key).await {
            tracing::debug!(provider = %self.key, "admitted after upstream block lifted");
        }

        self.limiter
            .execute_with_retry(&self.key, || self.upstream.open(payload))
            .await
            .inspect_err(|e| {
                tracing::warn!(provider = %self.key, error = %e, kind = ?e.kind(), "upstream call failed");
            })
    }
}
