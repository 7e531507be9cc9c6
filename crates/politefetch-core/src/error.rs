use std::fmt::{Display, Formatter};
use std::time::Duration;

use thiserror::Error;

/// Construction-time errors. These indicate a programming mistake in the
/// caller's setup, never an environmental condition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("max_concurrent_requests must be at least 1")]
    ZeroConcurrency,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("backoff_base must be greater than zero")]
    ZeroBackoffBase,
    #[error("max_backoff ({max:?}) must be >= backoff_base ({base:?})")]
    BackoffCeilingTooLow { base: Duration, max: Duration },
    #[error("user_agent_label cannot be empty")]
    EmptyUserAgentLabel,

    #[error("identity profile name cannot be empty")]
    EmptyProfileName,
    #[error("invalid header name '{name}'")]
    InvalidHeaderName { name: String },
    #[error("invalid value for header '{name}'")]
    InvalidHeaderValue { name: String },
    #[error("header '{name}' is listed more than once in the profile defaults")]
    DuplicateHeader { name: String },
    #[error("unknown tls profile '{id}', expected one of chrome-131, firefox-133, safari-18")]
    UnknownTlsProfile { id: String },

    #[error("transport could not be built: {0}")]
    Transport(String),
}

/// Failure classes surfaced through `FetchResult::error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    InvalidUrl,
    /// The request cannot be put on the wire, e.g. a malformed caller header.
    InvalidRequest,
    ConnectionFailed,
    Timeout,
    TlsFailure,
    HttpStatus(u16),
    PolicyDenied,
    Cancelled,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::InvalidRequest => "invalid_request",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::TlsFailure => "tls_failure",
            Self::HttpStatus(_) => "http_status",
            Self::PolicyDenied => "policy_denied",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this class of failure is worth another attempt.
    ///
    /// Transport-level failures, `429` and `5xx` are transient; everything
    /// else is terminal on the first occurrence. TLS failures are terminal
    /// because a handshake rejection does not heal on its own.
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::ConnectionFailed | Self::Timeout => true,
            Self::HttpStatus(code) => code == 429 || (code >= 500 && code < 600),
            Self::InvalidUrl
            | Self::InvalidRequest
            | Self::TlsFailure
            | Self::PolicyDenied
            | Self::Cancelled => false,
        }
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpStatus(code) => write!(f, "http_status({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Structured per-request failure with enough context to log usefully.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} for {url} after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    kind: FetchErrorKind,
    url: String,
    attempts: u32,
    cause: String,
    retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            attempts: 0,
            cause: cause.into(),
            retry_after: None,
        }
    }

    pub fn invalid_url(url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidUrl, url, cause)
    }

    pub fn invalid_request(url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidRequest, url, cause)
    }

    pub fn policy_denied(url: impl Into<String>) -> Self {
        Self::new(
            FetchErrorKind::PolicyDenied,
            url,
            "disallowed by robots.txt",
        )
    }

    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Cancelled, url, "fetch was cancelled")
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::new(
            FetchErrorKind::HttpStatus(status),
            url,
            format!("server responded with status {status}"),
        )
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }

    /// Server-requested delay parsed from a `Retry-After` header.
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes_follow_status_ranges() {
        assert!(FetchErrorKind::ConnectionFailed.is_retryable());
        assert!(FetchErrorKind::Timeout.is_retryable());
        assert!(FetchErrorKind::HttpStatus(429).is_retryable());
        assert!(FetchErrorKind::HttpStatus(500).is_retryable());
        assert!(FetchErrorKind::HttpStatus(503).is_retryable());
        assert!(!FetchErrorKind::HttpStatus(404).is_retryable());
        assert!(!FetchErrorKind::HttpStatus(400).is_retryable());
        assert!(!FetchErrorKind::InvalidUrl.is_retryable());
        assert!(!FetchErrorKind::InvalidRequest.is_retryable());
        assert!(!FetchErrorKind::PolicyDenied.is_retryable());
        assert!(!FetchErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn display_carries_url_attempts_and_cause() {
        let error = FetchError::http_status("https://example.test/a", 503).with_attempts(4);
        let rendered = error.to_string();

        assert!(rendered.contains("http_status(503)"));
        assert!(rendered.contains("https://example.test/a"));
        assert!(rendered.contains("4 attempt(s)"));
        assert!(rendered.contains("status 503"));
    }
}
