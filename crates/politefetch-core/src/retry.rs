//! Retry decisions with exponential backoff and jitter.

use std::time::Duration;

use time::format_description::well_known::Rfc2822;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::config::ClientConfig;
use crate::error::FetchError;

/// Exponential backoff: `base * 2^attempt + jitter`, jitter uniform in `[0, base]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// The initial backoff duration.
    pub base: Duration,
    /// The maximum duration to wait between retries.
    pub max: Duration,
    /// Whether to add random jitter in `[0, base]`.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(120),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retrying after the given 0-based attempt failed.
    pub fn delay(self, attempt: u32) -> Duration {
        let scale = 2_u32.saturating_pow(attempt);
        let mut delay = self.base.saturating_mul(scale);

        if self.jitter {
            let base_nanos = u64::try_from(self.base.as_nanos()).unwrap_or(u64::MAX);
            let jitter = Duration::from_nanos(fastrand::u64(0..=base_nanos));
            delay = delay.saturating_add(jitter);
        }

        delay.min(self.max)
    }
}

/// Outcome of consulting the retry policy about one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Decides whether a failed attempt is tried again.
pub(crate) trait RetryStrategy: Send + Sync {
    fn should_retry(&self, attempt: u32, error: &FetchError) -> RetryDecision;
}

/// Pure decision function over the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-attempts allowed after the first try.
    pub retry_limit: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(retry_limit: u32, backoff: Backoff) -> Self {
        Self {
            retry_limit,
            backoff,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.retry_limit,
            Backoff {
                base: config.backoff_base,
                max: config.max_backoff,
                jitter: true,
            },
        )
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self::new(0, Backoff::default())
    }

    /// Decides what to do after attempt number `attempt` (0-based) failed.
    ///
    /// A server-provided `Retry-After` replaces the computed backoff. A server
    /// asking for longer than the backoff ceiling is not retried at all.
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.retry_limit {
            return RetryDecision::GiveUp;
        }

        match error.retry_after() {
            Some(requested) if requested > self.backoff.max => RetryDecision::GiveUp,
            Some(requested) => RetryDecision::RetryAfter(requested),
            None => RetryDecision::RetryAfter(self.backoff.delay(attempt)),
        }
    }
}

impl RetryStrategy for RetryPolicy {
    fn should_retry(&self, attempt: u32, error: &FetchError) -> RetryDecision {
        RetryPolicy::should_retry(self, attempt, error)
    }
}

/// Parses a `Retry-After` value: either delta-seconds or an HTTP-date.
///
/// Dates in the past collapse to zero.
pub fn parse_retry_after(value: &str, now: OffsetDateTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = parse_http_date(value)?;
    let remaining = at - now;
    if remaining.is_negative() {
        return Some(Duration::ZERO);
    }
    Duration::try_from(remaining).ok()
}

fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc2822) {
        return Some(parsed);
    }

    // IMF-fixdate with a literal "GMT" zone, which RFC 2822 parsers may refuse.
    let stripped = value.strip_suffix("GMT")?.trim_end();
    let format = time::format_description::parse(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second]",
    )
    .ok()?;
    PrimitiveDateTime::parse(stripped, &format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;

    fn policy(retry_limit: u32) -> RetryPolicy {
        RetryPolicy::new(
            retry_limit,
            Backoff {
                base: Duration::from_millis(100),
                max: Duration::from_secs(10),
                jitter: true,
            },
        )
    }

    fn failure(kind: FetchErrorKind) -> FetchError {
        FetchError::new(kind, "https://example.test/", "synthetic")
    }

    #[test]
    fn exponential_backoff_without_jitter() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
    }

    #[test]
    fn jitter_stays_within_one_base() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(60),
            jitter: true,
        };

        for _ in 0..50 {
            for attempt in 0..5 {
                let floor = Duration::from_millis(100) * 2_u32.pow(attempt);
                let delay = backoff.delay(attempt);
                assert!(delay >= floor, "attempt={attempt}, delay={delay:?}");
                assert!(
                    delay <= floor + Duration::from_millis(100),
                    "attempt={attempt}, delay={delay:?}"
                );
            }
        }
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_the_ceiling() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(200), backoff.max);
    }

    #[test]
    fn transient_failures_are_retried_until_the_limit() {
        let policy = policy(3);
        for kind in [
            FetchErrorKind::ConnectionFailed,
            FetchErrorKind::Timeout,
            FetchErrorKind::HttpStatus(429),
            FetchErrorKind::HttpStatus(503),
        ] {
            for attempt in 0..3 {
                assert!(matches!(
                    policy.should_retry(attempt, &failure(kind)),
                    RetryDecision::RetryAfter(_)
                ));
            }
            assert_eq!(policy.should_retry(3, &failure(kind)), RetryDecision::GiveUp);
        }
    }

    #[test]
    fn terminal_failures_give_up_immediately() {
        let policy = policy(5);
        for kind in [
            FetchErrorKind::InvalidUrl,
            FetchErrorKind::HttpStatus(400),
            FetchErrorKind::HttpStatus(404),
            FetchErrorKind::HttpStatus(451),
            FetchErrorKind::PolicyDenied,
            FetchErrorKind::Cancelled,
        ] {
            assert_eq!(policy.should_retry(0, &failure(kind)), RetryDecision::GiveUp);
        }
    }

    #[test]
    fn zero_retry_limit_never_retries() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(
            policy.should_retry(0, &failure(FetchErrorKind::HttpStatus(503))),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn retry_after_overrides_computed_backoff() {
        let policy = policy(3);
        let error = failure(FetchErrorKind::HttpStatus(429))
            .with_retry_after(Some(Duration::from_secs(7)));

        assert_eq!(
            policy.should_retry(2, &error),
            RetryDecision::RetryAfter(Duration::from_secs(7))
        );
    }

    #[test]
    fn retry_after_beyond_the_ceiling_gives_up() {
        let policy = policy(3);
        let error = failure(FetchErrorKind::HttpStatus(503))
            .with_retry_after(Some(Duration::from_secs(3600)));

        assert_eq!(policy.should_retry(0, &error), RetryDecision::GiveUp);
    }

    #[test]
    fn retry_after_at_the_ceiling_is_honoured() {
        let policy = policy(3);
        let error = failure(FetchErrorKind::HttpStatus(429))
            .with_retry_after(Some(Duration::from_secs(10)));

        assert_eq!(
            policy.should_retry(0, &error),
            RetryDecision::RetryAfter(Duration::from_secs(10))
        );
    }

    #[test]
    fn parses_delta_seconds() {
        let now = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 ", now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("-5", now), None);
    }

    #[test]
    fn parses_http_dates_relative_to_now() {
        let now = OffsetDateTime::parse("Sun, 06 Nov 1994 08:49:07 GMT", &Rfc2822)
            .or_else(|_| OffsetDateTime::parse("Sun, 06 Nov 1994 08:49:07 +0000", &Rfc2822))
            .expect("reference date parses");

        assert_eq!(
            parse_retry_after("Sun, 06 Nov 1994 08:49:37 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Sun, 06 Nov 1994 08:00:00 GMT", now),
            Some(Duration::ZERO)
        );
    }
}
