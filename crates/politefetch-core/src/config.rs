//! Client configuration snapshot.
//!
//! Durations travel as (fractional) seconds when the config is serialized, so
//! `{"request_delay": 0.5}` means half a second between departures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Immutable per-client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Crawler token used for robots.txt group matching.
    pub user_agent_label: String,
    /// Minimum spacing between two request departures.
    #[serde(with = "seconds")]
    pub request_delay: Duration,
    /// Ceiling on simultaneously in-flight transport calls.
    pub max_concurrent_requests: usize,
    /// Per-attempt deadline.
    #[serde(with = "seconds")]
    pub timeout: Duration,
    /// Re-attempts after the first try; total attempts = `retry_limit + 1`.
    pub retry_limit: u32,
    pub respect_robots: bool,
    /// Lifetime of a cached robots.txt verdict.
    #[serde(with = "seconds")]
    pub robots_ttl: Duration,
    #[serde(with = "seconds")]
    pub backoff_base: Duration,
    /// Ceiling for computed backoff. A longer server `Retry-After` ends the fetch.
    #[serde(with = "seconds")]
    pub max_backoff: Duration,
}

pub const DEFAULT_ROBOTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent_label: String::from("politefetch"),
            request_delay: Duration::from_secs(1),
            max_concurrent_requests: 4,
            timeout: Duration::from_secs(30),
            retry_limit: 3,
            respect_robots: true,
            robots_ttl: DEFAULT_ROBOTS_TTL,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    pub fn with_request_delay(mut self, request_delay: Duration) -> Self {
        self.request_delay = request_delay;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_respect_robots(mut self, respect_robots: bool) -> Self {
        self.respect_robots = respect_robots;
        self
    }

    pub fn with_user_agent_label(mut self, label: impl Into<String>) -> Self {
        self.user_agent_label = label.into();
        self
    }

    pub fn with_robots_ttl(mut self, robots_ttl: Duration) -> Self {
        self.robots_ttl = robots_ttl;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.max_backoff = max;
        self
    }

    /// Checks the invariants a client relies on for its whole lifetime.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigurationError::ZeroConcurrency);
        }
        if self.timeout.is_zero() {
            return Err(ConfigurationError::ZeroTimeout);
        }
        if self.user_agent_label.trim().is_empty() {
            return Err(ConfigurationError::EmptyUserAgentLabel);
        }
        if self.backoff_base.is_zero() {
            return Err(ConfigurationError::ZeroBackoffBase);
        }
        if self.max_backoff < self.backoff_base {
            return Err(ConfigurationError::BackoffCeilingTooLow {
                base: self.backoff_base,
                max: self.max_backoff,
            });
        }
        Ok(())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(raw).map_err(|_| {
            D::Error::custom(format!(
                "expected a finite, non-negative number of seconds, got {raw}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_polite() {
        let config = ClientConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.request_delay, Duration::from_secs(1));
        assert!(config.respect_robots);
        assert_eq!(config.robots_ttl, DEFAULT_ROBOTS_TTL);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ClientConfig::default().with_max_concurrent_requests(0);
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroConcurrency));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = ClientConfig::default().with_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroTimeout));
    }

    #[test]
    fn zero_request_delay_is_allowed() {
        let config = ClientConfig::default().with_request_delay(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_ceiling_below_base_is_rejected() {
        let config = ClientConfig::default()
            .with_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::BackoffCeilingTooLow { .. })
        ));
    }

    #[test]
    fn deserializes_fractional_seconds_and_fills_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"request_delay": 0.25, "max_concurrent_requests": 2, "respect_robots": false}"#,
        )
        .expect("config should parse");

        assert_eq!(config.request_delay, Duration::from_millis(250));
        assert_eq!(config.max_concurrent_requests, 2);
        assert!(!config.respect_robots);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_limit, 3);
    }

    #[test]
    fn negative_seconds_fail_to_deserialize() {
        let parsed = serde_json::from_str::<ClientConfig>(r#"{"request_delay": -1.0}"#);
        assert!(parsed.is_err());
    }
}
