//! Error types for the model-service layer.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Details attached to a rate-limit rejection.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The message returned by the provider.
    pub message: String,
    /// How long the provider asked us to wait, if it said.
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build from a provider message plus an optional `Retry-After` header.
    pub fn from_header(message: impl Into<String>, retry_after_header: Option<&str>) -> Self {
        Self {
            message: message.into(),
            retry_after: retry_after_header.and_then(parse_retry_after_header),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse a `Retry-After` header given in whole seconds.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Error
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for model-service operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Connectivity failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// Missing API key, bad base URL and the like.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The request or the model's reply was structurally invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider throttled us.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Create a rate limit error from a bare message.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    /// The wait hint carried by a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Network and rate limit failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Network("timeout".to_string()).is_retryable());
        assert!(LlmError::rate_limit("slow down").is_retryable());
        assert!(!LlmError::Config("no key".to_string()).is_retryable());
        assert!(!LlmError::Auth("denied".to_string()).is_retryable());
        assert!(!LlmError::Backend("500".to_string()).is_retryable());
    }

    #[test]
    fn test_rate_limit_from_header() {
        let info = RateLimitInfo::from_header("quota", Some(" 7 "));
        assert_eq!(info.retry_after, Some(Duration::from_secs(7)));

        let info = RateLimitInfo::from_header("quota", Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert!(info.retry_after.is_none());

        let info = RateLimitInfo::from_header("quota", None);
        assert!(info.retry_after.is_none());
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        let err = LlmError::RateLimit(RateLimitInfo::from_header("quota", Some("3")));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(LlmError::Network("x".to_string()).retry_after(), None);
    }

    #[test]
    fn test_display() {
        let err = LlmError::RateLimit(RateLimitInfo::from_header("quota exhausted", Some("2")));
        let text = err.to_string();
        assert!(text.starts_with("Rate limit exceeded: quota exhausted"));
        assert!(text.contains("retry after 2.00s"));

        assert_eq!(
            LlmError::Backend("boom".to_string()).to_string(),
            "Backend error: boom"
        );
    }
}
