use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure kinds shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller-supplied data failed validation.
    InvalidInput,
    /// Authentication failure, malformed upstream response, or an unclassified 4xx.
    ApiError,
    /// HTTP 429 from upstream.
    RateLimit,
    /// HTTP 5xx, or an upstream job that reported failure / ran out of attempts.
    ProviderError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::ApiError => "API_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::ProviderError => "PROVIDER_ERROR",
        }
    }

    /// Only invalid input is known to fail identically on every attempt.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::InvalidInput)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one error type that crosses every boundary (validation, HTTP, polling, dispatch).
///
/// `provider` is always populated, including when the error is raised by shared middleware,
/// so a caller of a dispatch provider can tell which backend failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: provider.into(),
            details: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message, provider)
    }

    pub fn api(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message, provider)
    }

    pub fn rate_limit(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message, provider)
    }

    pub fn provider(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderError, message, provider)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_provider_and_message() {
        let e = ProviderError::api("Invalid API key", "tavily");
        assert_eq!(e.to_string(), "tavily: Invalid API key");
        assert_eq!(e.kind, ErrorKind::ApiError);
    }

    #[test]
    fn only_invalid_input_is_non_retryable() {
        assert!(!ErrorKind::InvalidInput.is_retryable());
        assert!(ErrorKind::ApiError.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::ProviderError.is_retryable());
    }

    #[test]
    fn serializes_kind_in_screaming_case() {
        let e = ProviderError::rate_limit("slow down", "brave")
            .with_details(serde_json::json!({ "reset_epoch_s": 1700000000u64 }));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "RATE_LIMIT");
        assert_eq!(v["provider"], "brave");
        assert_eq!(v["details"]["reset_epoch_s"], 1700000000u64);
    }
}
