use std::time::Duration;

use http::StatusCode;
use relay_ratelimit::{RateLimitError, Retryable};
use thiserror::Error;

/// Coarse classification of an [`LlmError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid provider configuration, fatal at construction
    Configuration,
    /// Upstream rejected the credential
    Authentication,
    /// Upstream rejected the request as malformed
    InvalidRequest,
    /// Network failure, 5xx, 429 or establishment timeout
    Transient,
    /// Failure after chunks began flowing
    Stream,
    /// Unexpected internal error
    Internal,
}

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// No provider is configured to serve the request
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Upstream rejected the credential (401/403)
    #[error("upstream rejected credentials ({status}): {message}")]
    Unauthorized { status: StatusCode, message: String },

    /// Upstream rejected the request (4xx other than 401/403/408/429)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream answered 429
    #[error("upstream rate limited")]
    RateLimited {
        /// Delay requested via `Retry-After`
        retry_after: Option<Duration>,
    },

    /// Network failure, 408 or 5xx from the upstream
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Upstream did not answer within the establishment timeout
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// Error during streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Classify an unsuccessful upstream status
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized {
                status,
                message: body.to_owned(),
            },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            StatusCode::REQUEST_TIMEOUT => Self::Upstream(format!("provider returned {status}: {body}")),
            s if s.is_client_error() => Self::InvalidRequest(format!("provider returned {status}: {body}")),
            _ => Self::Upstream(format!("provider returned {status}: {body}")),
        }
    }

    /// Taxonomy bucket of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::ProviderNotFound { .. } => ErrorKind::Configuration,
            Self::Unauthorized { .. } => ErrorKind::Authentication,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::RateLimited { .. } | Self::Upstream(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::Streaming(_) => ErrorKind::Stream,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether establishing the call again may succeed
    ///
    /// Only call establishment is ever retried; stream errors are terminal.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Error type string carried in error frames
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration_error",
            Self::ProviderNotFound { .. } => "not_found_error",
            Self::Unauthorized { .. } => "authentication_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::Upstream(_) => "upstream_error",
            Self::Timeout(_) => "timeout_error",
            Self::Streaming(_) => "streaming_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to downstream clients
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::Unauthorized { status, .. } => format!("upstream rejected credentials ({status})"),
            other => other.to_string(),
        }
    }
}

impl Retryable for LlmError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<RateLimitError> for LlmError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::Config(message) => Self::Config(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_permanent() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let error = LlmError::from_status(status, None, "bad key");
            assert_eq!(error.kind(), ErrorKind::Authentication);
            assert!(!error.is_retryable());
        }
    }

    #[test]
    fn client_errors_are_invalid_requests() {
        let error = LlmError::from_status(StatusCode::UNPROCESSABLE_ENTITY, None, "no such model");
        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
        assert!(!error.is_retryable());
    }

    #[test]
    fn server_errors_are_transient() {
        let error = LlmError::from_status(StatusCode::SERVICE_UNAVAILABLE, None, "");
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.is_retryable());
    }

    #[test]
    fn request_timeout_is_transient() {
        let error = LlmError::from_status(StatusCode::REQUEST_TIMEOUT, None, "model still loading");
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.is_retryable());
        assert_eq!(error.error_type(), "upstream_error");
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let error = LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), "");
        assert!(error.is_transient());
        assert_eq!(Retryable::retry_after(&error), Some(Duration::from_secs(7)));
    }

    #[test]
    fn stream_errors_are_not_retried() {
        let error = LlmError::Streaming("connection reset".to_owned());
        assert_eq!(error.kind(), ErrorKind::Stream);
        assert!(!error.is_retryable());
    }

    #[test]
    fn client_message_hides_internals() {
        let error = LlmError::Internal(anyhow::anyhow!("secret detail"));
        assert_eq!(error.client_message(), "an internal error occurred");

        let error = LlmError::from_status(StatusCode::UNAUTHORIZED, None, "key sk-123 invalid");
        assert!(!error.client_message().contains("sk-123"));
    }
}
